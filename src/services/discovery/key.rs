use super::types::DiscoveryError;

pub const KEY_SEPARATOR: char = '/';

// 键的各段依次为 root / category / job / instance
const SEGMENT_NAMES: [&str; 4] = ["root", "category", "job", "instance"];

/// 服务注册键，格式为 `<root>/<category>/<job>/<instance>`
///
/// 以分隔符开头的键 root 段为空，例如 `/discovery/webapp/instance-7`
/// 解析为 category `discovery`、job `webapp`、instance `instance-7`。
/// instance 之后的段会被忽略。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationKey<'a> {
    pub root: &'a str,
    pub category: &'a str,
    pub job: &'a str,
    pub instance: &'a str,
}

impl<'a> RegistrationKey<'a> {
    pub fn parse(key: &'a str) -> Result<Self, DiscoveryError> {
        let mut segments = key.split(KEY_SEPARATOR);
        let mut next = |name: &str| {
            segments.next().ok_or_else(|| DiscoveryError::MalformedKey {
                key: key.to_string(),
                reason: format!(
                    "missing {name} segment, expected <{}>",
                    SEGMENT_NAMES.join("/")
                ),
            })
        };

        let parsed = Self {
            root: next(SEGMENT_NAMES[0])?,
            category: next(SEGMENT_NAMES[1])?,
            job: next(SEGMENT_NAMES[2])?,
            instance: next(SEGMENT_NAMES[3])?,
        };

        // job 和 instance 会出现在抓取目标和标签中，不能为空
        for (name, value) in [("job", parsed.job), ("instance", parsed.instance)] {
            if value.is_empty() {
                return Err(DiscoveryError::MalformedKey {
                    key: key.to_string(),
                    reason: format!("empty {name} segment"),
                });
            }
        }

        Ok(parsed)
    }

    pub fn format(category: &str, job: &str, instance: &str) -> String {
        format!("{KEY_SEPARATOR}{category}{KEY_SEPARATOR}{job}{KEY_SEPARATOR}{instance}")
    }
}
