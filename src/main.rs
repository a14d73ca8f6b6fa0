use std::process;

use flexserve::config::Config;
use flexserve::server::{listener, tls};

fn main() {
    let cfg = match Config::from_args(std::env::args().skip(1)) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("{err}");
            eprint!("{}", Config::USAGE);
            process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cfg.threads)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!("failed to start runtime: {err}");
            process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(serve(cfg)) {
        tracing::error!("fatal: {err:#}");
        process::exit(1);
    }
}

async fn serve(cfg: Config) -> anyhow::Result<()> {
    let acceptor = tls::load_server_certificate(&cfg.cert_path, &cfg.key_path)?;
    let listener = listener::bind(cfg.listen_addr()).await?;

    tokio::select! {
        res = listener::run(listener, acceptor, cfg.doc_root.clone()) => {
            res
        }

        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
    }
}

/// Resolves when SIGINT (ctrl-c) or, on unix, SIGTERM arrives.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
