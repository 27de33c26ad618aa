use std::process;
use std::thread;
use std::time::Duration;

use autoapp_core::BOOTSTRAP_APP;
use autoapp_installer::PartialBuilds;

/// Wall-clock ceiling for one run.
pub(crate) const RUN_TIME_LIMIT: Duration = Duration::from_secs(3600);

pub(crate) const INTERRUPT_MESSAGE: &str = "Aborted by user";

/// Starts a detached timer that ends the process once `limit` elapses.
pub(crate) fn arm(limit: Duration, builds: PartialBuilds) {
    let spawned = thread::Builder::new()
        .name("watchdog".to_string())
        .spawn(move || {
            thread::sleep(limit);
            abort(&builds, &timeout_message(limit));
        });
    if let Err(err) = spawned {
        tracing::warn!("run time limit is not enforced: {err}");
    }
}

/// Exits with status 1 on Ctrl-C instead of dying mid-build.
pub(crate) fn handle_interrupt(builds: PartialBuilds) {
    if let Err(err) = ctrlc::set_handler(move || abort(&builds, INTERRUPT_MESSAGE)) {
        tracing::warn!("interrupts will not clean up unfinished installs: {err}");
    }
}

fn abort(builds: &PartialBuilds, message: &str) -> ! {
    discard_unfinished(builds);
    eprintln!("! {message}");
    process::exit(1);
}

/// Removes environments whose build had not finished.
pub(crate) fn discard_unfinished(builds: &PartialBuilds) {
    for path in builds.discard() {
        tracing::debug!("removed unfinished install {}", path.display());
    }
}

pub(crate) fn timeout_message(limit: Duration) -> String {
    format!(
        "Aborting since {BOOTSTRAP_APP} has been running for more than {} minutes",
        limit.as_secs() / 60
    )
}
