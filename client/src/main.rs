use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cf_client::filepaths;
use cf_client::network::client_commands::ClientCommand;
use cf_client::network::{NetworkEvent, NetworkRuntime};
use cf_client::session::ClientSession;
use cf_client::settings::ClientSettings;

const CLIENT_NAME: &str = "cf-client";

/// Time between animation ticks.
const TICK: Duration = Duration::from_millis(120);

fn main() {
    let settings = ClientSettings::load(&filepaths::settings_file_path());

    let log_file = settings
        .log_file
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned());
    cf_core::initialize_logger(settings.log_level_filter(), log_file.as_deref()).unwrap_or_else(
        |e| {
            eprintln!("Failed to initialize logger: {}. Exiting.", e);
            process::exit(1);
        },
    );

    log::info!("Starting {CLIENT_NAME} v{}", env!("CARGO_PKG_VERSION"));

    let quit_flag = Arc::new(AtomicBool::new(false));
    let quit_flag_clone = quit_flag.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("Got signal to terminate. Shutdown initiated...");
        quit_flag_clone.store(true, Ordering::SeqCst);
    }) {
        log::warn!("Unable to install signal handler: {e}");
    }

    let mut net = match NetworkRuntime::connect(&settings.server_host, settings.server_port) {
        Ok(net) => net,
        Err(e) => {
            log::error!(
                "Failed to connect to {}:{}: {e}. Exiting.",
                settings.server_host,
                settings.server_port
            );
            process::exit(1);
        }
    };

    let mut session = ClientSession::from_settings(&settings);
    let (view_w, view_h) = session.map().view_size();
    let mapsize = format!("{view_w}x{view_h}");

    net.send(&ClientCommand::new_version(CLIENT_NAME));
    net.send(&ClientCommand::new_setup(&[
        ("map2cmd", "1"),
        ("mapsize", mapsize.as_str()),
        ("facecache", "1"),
        ("extendedMapInfos", "1"),
    ]));
    net.send(&ClientCommand::new_request_image_info());

    let mut next_tick = Instant::now() + TICK;
    while !quit_flag.load(Ordering::SeqCst) && !session.is_finished() {
        let wait = next_tick.saturating_duration_since(Instant::now());
        match net.recv_timeout(wait) {
            Some(NetworkEvent::Frame(frame)) => {
                if let Err(e) = session.handle_frame(&frame) {
                    log::warn!("{e}");
                }
                for request in session.take_face_requests() {
                    net.send(&request);
                }
            }
            Some(NetworkEvent::Status(status)) => log::info!("{status}"),
            Some(NetworkEvent::Error(e)) => {
                log::error!("{e}");
                break;
            }
            Some(NetworkEvent::Closed) => {
                log::info!("Connection closed by server");
                break;
            }
            None => {}
        }

        if Instant::now() >= next_tick {
            next_tick += TICK;
            session.animate();
        }
        if session.take_redraw() {
            log::trace!("map changed, origin {:?}", session.map().origin());
        }
    }

    net.shutdown();
    log::info!("Shutdown complete");
}
