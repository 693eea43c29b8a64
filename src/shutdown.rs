//! Ways to end a session: Enter on stdin, or a fixed run time.

use std::io::BufRead;
use std::thread;
use std::time::Duration;

use fxlms::CancelToken;
use tracing::info;

/// Cancels `token` when a line arrives on stdin. A closed stdin never cancels.
pub fn cancel_on_enter(token: &CancelToken) {
    let token = token.clone();
    thread::spawn(move || {
        let mut line = String::new();
        if let Ok(n) = std::io::stdin().lock().read_line(&mut line) {
            if n > 0 {
                info!("stop requested");
                token.cancel();
            }
        }
    });
}

/// Cancels `token` after `secs` seconds.
pub fn cancel_after(token: &CancelToken, secs: f32) {
    let token = token.clone();
    let duration = Duration::from_secs_f32(secs.max(0.0));
    thread::spawn(move || {
        thread::sleep(duration);
        info!(secs, "run time elapsed");
        token.cancel();
    });
}

/// Installs the watchers selected on the command line.
pub fn install(token: &CancelToken, run_secs: Option<f32>) {
    match run_secs {
        Some(secs) => cancel_after(token, secs),
        None => {
            info!("press Enter to stop");
            cancel_on_enter(token);
        }
    }
}
