use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use sonance::catalog::Store;
use sonance::cli::{print_version, Cli};
use sonance::config::Config;
use sonance::http::{build_router, AppState};
use sonance::logging;
use sonance::mainloop::MainLoop;
use sonance::scanner::Scanner;
use sonance::scheduler::Scheduler;

fn main() {
    let cli = Cli::parse();

    if cli.version {
        print_version();
        std::process::exit(0);
    }

    logging::init(cli.trace, cli.no_color);

    if let Err(err) = run(cli) {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.unwrap_or_else(|| PathBuf::from("/etc/sonanced.conf"));
    let config = Config::load(&config_path)?;

    if !config.document_root.is_dir() {
        Err(sonance::error::AppError::InvalidDocumentRoot(
            config.document_root.clone(),
        ))?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    let store = Arc::new(runtime.block_on(Store::open(&config.database_path))?);

    let scheduler = Arc::new(Scheduler::new(config.scheduler_threads));
    let scanner = Arc::new(Scanner::new(
        config.music_dirs.clone(),
        Arc::clone(&store),
        runtime.handle().clone(),
    ));

    let app_state = AppState {
        store: Arc::clone(&store),
        document_root: Arc::new(config.document_root.clone()),
    };
    let router = build_router(app_state);

    let bind_address = format!("{}:{}", config.listening_address, config.listening_port);
    let listener = runtime
        .block_on(tokio::net::TcpListener::bind(&bind_address))
        .map_err(|source| sonance::error::AppError::Bind {
            address: bind_address.clone(),
            source,
        })?;
    log::info!("HTTP server listening on {bind_address}");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server_handle = {
        let runtime_handle = runtime.handle().clone();
        std::thread::Builder::new()
            .name("sonance-http".to_string())
            .spawn(move || {
                runtime_handle.block_on(async move {
                    let shutdown_signal = async move {
                        let _ = shutdown_rx.await;
                    };
                    let result = axum::serve(listener, router)
                        .with_graceful_shutdown(shutdown_signal)
                        .await;
                    if let Err(err) = result {
                        log::error!("HTTP server exited with error: {err}");
                    }
                });
            })
            .expect("failed to spawn HTTP server thread")
    };

    let main_loop = MainLoop::new(Arc::clone(&scheduler), Arc::clone(&scanner))?;
    main_loop.run();

    let _ = shutdown_tx.send(());
    let _ = server_handle.join();

    scheduler.close();
    runtime.block_on(store.close());

    log::info!("Shutdown complete");
    Ok(())
}
