use std::future::Future;
use std::time::Duration;

/// Platform-independent helper to spawn an async task that runs in the background.
#[cfg(target_arch = "wasm32")]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}

/// Platform-independent helper to spawn an async task that runs in the background.
///
/// Outside of a Tokio context the task lands on a current-thread runtime
/// driven by a dedicated background thread.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    use std::sync::LazyLock;
    use tokio::runtime::{Builder, Handle};

    static BACKGROUND_RUNTIME: LazyLock<Handle> = LazyLock::new(|| {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build background tokio runtime");
        let handle = runtime.handle().clone();
        std::thread::Builder::new()
            .name("popup-oauth-relay-runtime".into())
            .spawn(move || runtime.block_on(std::future::pending::<()>()))
            .expect("failed to start background runtime thread");
        handle
    });

    if let Ok(handle) = Handle::try_current() {
        handle.spawn(future);
    } else {
        BACKGROUND_RUNTIME.spawn(future);
    }
}

/// Asynchronously waits for the provided duration in a platform-compatible way.
pub async fn sleep(duration: Duration) {
    if duration.is_zero() {
        return;
    }

    sleep_impl(duration).await;
}

/// Re-evaluates `condition` every `interval` and returns once it holds.
///
/// The first check happens after one full interval, never immediately.
pub async fn poll_until<F>(interval: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    loop {
        sleep(interval).await;
        if condition() {
            return;
        }
    }
}

#[cfg(target_arch = "wasm32")]
async fn sleep_impl(duration: Duration) {
    use gloo_timers::future::sleep;
    sleep(duration).await;
}

#[cfg(not(target_arch = "wasm32"))]
async fn sleep_impl(duration: Duration) {
    use tokio::time::sleep;
    sleep(duration).await;
}
