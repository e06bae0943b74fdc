//! Vitrine
//!
//! A minimal X11 compositing window manager. Top-level windows are redirected
//! off-screen and their contents streamed to an external renderer, whose
//! output window lives inside the Composite overlay.

mod compositor;
mod config;
mod consumer;
mod error;
mod extensions;
mod input;
mod renderer;
mod server;
mod wm;
mod x11;

#[cfg(test)]
mod testing;

use std::io;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use mio::net::UnixStream;
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::consumer::KnownHost;
use crate::renderer::{CommandReader, IpcConsumer};
use crate::server::{DisplayServer, WindowId};
use crate::wm::Session;
use crate::x11::X11Server;

const X11_TOKEN: Token = Token(0);
const RENDERER_TOKEN: Token = Token(1);

const HOST_WINDOW_ENV: &str = "VITRINE_HOST_WINDOW";

type VitrineSession = Session<X11Server, IpcConsumer<UnixStream>>;

#[derive(Debug, Default, PartialEq)]
struct Args {
    host_window: Option<WindowId>,
    config: Option<PathBuf>,
}

/// Window ids are accepted in decimal or `0x` hex, as xwininfo prints them
fn parse_window_id(text: &str) -> Result<WindowId> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => WindowId::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.with_context(|| format!("Invalid window id {:?}", text))
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args::default();
    let mut iter = args.iter().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--host-window" => {
                let value = iter.next().context("--host-window needs a window id")?;
                parsed.host_window = Some(parse_window_id(value)?);
            }
            "--config" => {
                let value = iter.next().context("--config needs a path")?;
                parsed.config = Some(PathBuf::from(value));
            }
            other => bail!("Unknown argument {:?}", other),
        }
    }

    Ok(parsed)
}

fn init_logging(config: &Config) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .or_else(|| config.log.filter.clone())
        .unwrap_or_else(|| "vitrine=debug,info".into());

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Host window from the command line, then the environment, then config
fn host_window(args: &Args, config: &Config) -> Result<Option<WindowId>> {
    if args.host_window.is_some() {
        return Ok(args.host_window);
    }
    if let Ok(value) = std::env::var(HOST_WINDOW_ENV) {
        return parse_window_id(&value)
            .with_context(|| format!("Bad {}", HOST_WINDOW_ENV))
            .map(Some);
    }
    Ok(config.output.host_window)
}

fn connect_renderer(config: &Config) -> Result<UnixStream> {
    let path = config.renderer.socket_path();
    let stream = StdUnixStream::connect(&path)
        .with_context(|| format!("Failed to connect to renderer at {:?}", path))?;
    stream.set_nonblocking(true)?;
    info!("Connected to renderer at {:?}", path);
    Ok(UnixStream::from_std(stream))
}

/// Handle every event x11rb has buffered or can read without blocking
fn drain_x_events(session: &mut VitrineSession) -> Result<()> {
    while let Some(raw) = session.server().poll_raw_event()? {
        session.handle_raw(&raw)?;
    }
    session.server().flush()
}

fn flush_renderer(session: &mut VitrineSession) -> Result<()> {
    let consumer = session.consumer_mut();
    if let Some(e) = consumer.take_error() {
        return Err(e).context("Lost connection to renderer");
    }
    consumer.flush().context("Failed to write to renderer")?;
    if consumer.pending() > 0 {
        debug!("{} bytes waiting for the renderer", consumer.pending());
    }
    Ok(())
}

fn run(session: &mut VitrineSession) -> Result<()> {
    let mut poll = Poll::new().context("Failed to create mio Poll")?;
    let x_fd = session.server().raw_fd();

    poll.registry()
        .register(&mut SourceFd(&x_fd), X11_TOKEN, Interest::READABLE)
        .context("Failed to register X11 FD with mio")?;
    poll.registry()
        .register(
            session.consumer_mut().get_mut(),
            RENDERER_TOKEN,
            Interest::READABLE | Interest::WRITABLE,
        )
        .context("Failed to register renderer socket with mio")?;

    let mut events = Events::with_capacity(16);
    let mut commands = CommandReader::new();

    info!("Entering event loop");
    loop {
        // x11rb may already hold events read while waiting for replies
        drain_x_events(session)?;
        flush_renderer(session)?;

        if let Err(e) = poll.poll(&mut events, None) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(e).context("Event loop poll failed");
        }

        for event in events.iter() {
            match event.token() {
                X11_TOKEN => {}
                RENDERER_TOKEN if event.is_readable() => {
                    let received = commands.read_from(session.consumer_mut().get_mut())?;
                    for command in received {
                        session.apply_command(command)?;
                    }
                    if commands.is_closed() {
                        info!("Renderer closed the connection, shutting down");
                        return Ok(());
                    }
                }
                token => debug!("Ignoring readiness for {:?}", token),
            }
        }
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let args = parse_args(&args)?;

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().context("Failed to load configuration")?,
    };

    init_logging(&config);
    info!("Starting Vitrine compositing window manager");

    let host = KnownHost(host_window(&args, &config)?);
    let server = X11Server::connect(None)?;
    let output = config.output.size(server.screen_size());
    let screen_num = server.screen_num();
    let consumer = IpcConsumer::new(connect_renderer(&config)?, config.accept_policy())
        .with_max_pending(config.renderer.max_pending);

    let mut session = Session::start(
        server,
        consumer,
        &host,
        screen_num,
        output,
        config.settings(),
    )
    .inspect_err(|e| error!("Startup failed: {:#}", e))?;
    info!(
        "Compositing {} windows with roles {:?}",
        session.registry().len(),
        session.roles()
    );

    run(&mut session).inspect_err(|e| error!("Fatal: {:#}", e))
}
