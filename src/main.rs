use std::process::ExitCode;

/// Exit status when a second signal forces termination.
const FORCED_EXIT_CODE: i32 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    // The first signal sets the shutdown flag; a generation in progress
    // stops at its next state boundary and a running harness is left to
    // finish. A second signal exits immediately.
    tokio::spawn(async {
        shutdown_signal().await;
        testsmith::request_shutdown();
        eprintln!("\nReceived shutdown signal, finishing the current step (press Ctrl+C again to abort)...");

        shutdown_signal().await;
        eprintln!("Aborting.");
        std::process::exit(FORCED_EXIT_CODE);
    });

    match testsmith::cli::run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:?}", e);
            ExitCode::from(testsmith::errors::get_exit_code(&e))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(_) => {
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
