/// Delayed restart after a committed update
///
/// The restart runs on its own thread so the request handler can finish
/// writing the success response first. Once scheduled it cannot be cancelled.
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub trait Restart: Send + Sync + 'static {
    fn restart(&self);
}

impl<T: Restart + ?Sized> Restart for Arc<T> {
    fn restart(&self) {
        (**self).restart()
    }
}

pub struct RestartCoordinator<R> {
    restarter: Arc<R>,
    delay: Duration,
}

impl<R: Restart> RestartCoordinator<R> {
    pub fn new(restarter: R, delay: Duration) -> Self {
        Self {
            restarter: Arc::new(restarter),
            delay,
        }
    }

    pub fn restarter(&self) -> &R {
        &self.restarter
    }

    /// Fire-and-forget restart after `delay`.
    ///
    /// Returns an error only when the restart thread could not be spawned; the
    /// committed slot then boots on the next reset instead.
    pub fn schedule(&self) -> std::io::Result<()> {
        let restarter = Arc::clone(&self.restarter);
        let delay = self.delay;

        thread::Builder::new()
            .name("ota-restart".to_string())
            .stack_size(8 * 1024)
            .spawn(move || {
                thread::sleep(delay);
                log::info!("Restarting system...");
                log::logger().flush();
                restarter.restart();
            })?;

        log::info!("Restart scheduled in {} ms", delay.as_millis());
        Ok(())
    }
}
