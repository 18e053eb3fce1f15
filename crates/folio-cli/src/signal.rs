use folio_core::context::CancelFlag;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A flag that flips once Ctrl-C is pressed.
///
/// The listener lives on its own thread with a current-thread runtime, since
/// the pipeline itself is synchronous.
pub fn cancel_on_ctrl_c() -> CancelFlag {
    let flag: CancelFlag = Arc::new(AtomicBool::new(false));
    let hook = Arc::clone(&flag);

    let spawned = std::thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::warn!("ctrl-c handler unavailable: {e}");
                    return;
                }
            };
            rt.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received, finishing pages in flight");
                    hook.store(true, Ordering::SeqCst);
                }
            });
        });
    if let Err(e) = spawned {
        tracing::warn!("ctrl-c handler unavailable: {e}");
    }
    flag
}
