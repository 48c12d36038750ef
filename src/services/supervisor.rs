//! Fan-out/fan-in of long running units sharing one cancellation token.

use std::future::Future;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::server::ServerError;

/// 一组独立失败的长期任务
///
/// 任一任务退出（无论原因）都会取消共享令牌，其余任务随之开始关闭。
/// [`UnitGroup::wait`] 等待全部任务结束并返回最先出现的错误。
#[derive(Debug)]
pub struct UnitGroup {
    token: CancellationToken,
    units: JoinSet<(&'static str, Result<(), ServerError>)>,
}

impl UnitGroup {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            units: JoinSet::new(),
        }
    }

    pub fn spawn<F>(&mut self, name: &'static str, unit: F)
    where
        F: Future<Output = Result<(), ServerError>> + Send + 'static,
    {
        tracing::debug!(unit = name, "Starting unit");
        self.units.spawn(async move { (name, unit.await) });
    }

    pub async fn wait(mut self) -> Result<(), ServerError> {
        let mut first_error = None;

        while let Some(joined) = self.units.join_next().await {
            let outcome = match joined {
                Ok((name, Ok(()))) => {
                    tracing::info!(unit = name, "Unit finished");
                    Ok(())
                }
                Ok((name, Err(e))) => {
                    tracing::error!(unit = name, error = %e, "Unit failed");
                    Err(e)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Unit panicked or was aborted");
                    Err(ServerError::UnitPanicked(e.to_string()))
                }
            };

            self.token.cancel();
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn first_failure_cancels_the_rest_and_wins() {
        let token = CancellationToken::new();
        let mut group = UnitGroup::new(token.clone());

        let waiter = token.clone();
        group.spawn("waits", async move {
            waiter.cancelled().await;
            Ok(())
        });
        group.spawn("fails", async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Err(ServerError::UnitPanicked("boom".to_string()))
        });
        group.spawn("fails-later", async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Err(ServerError::UnitPanicked("late".to_string()))
        });

        let err = group.wait().await.expect_err("group should fail");
        assert!(token.is_cancelled());
        assert!(matches!(err, ServerError::UnitPanicked(ref m) if m == "boom"));
    }

    #[tokio::test]
    async fn clean_exits_return_ok() {
        let token = CancellationToken::new();
        let mut group = UnitGroup::new(token.clone());
        for name in ["a", "b"] {
            let token = token.clone();
            group.spawn(name, async move {
                token.cancelled().await;
                Ok(())
            });
        }

        token.cancel();
        group.wait().await.expect("group should succeed");
    }

    #[tokio::test]
    async fn panics_are_reported() {
        let mut group = UnitGroup::new(CancellationToken::new());
        group.spawn("panics", async {
            if true {
                panic!("unit exploded");
            }
            Ok(())
        });

        let err = group.wait().await.expect_err("panic should surface");
        assert!(matches!(err, ServerError::UnitPanicked(_)));
    }
}
