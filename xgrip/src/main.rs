use tracing_subscriber::EnvFilter;
use x11rb::protocol::xproto::Window;
use xgrip::error::{Error, Result};
use xgrip::x11::event::InputEvent;
use xgrip::XUtil;
use xgrip_core::config::{Action, Binding, Cfg, Trigger};

mod spawn;

fn main() {
    let cfg = match Cfg::new() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to read config: {e}");
            std::process::exit(1);
        }
    };
    init_logging(&cfg.options.log_filter);
    if let Err(e) = run(cfg) {
        tracing::error!("Fatal error: {e}");
        std::process::exit(1);
    }
    tracing::info!("Exiting xgrip");
}

fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .init();
}

fn run(cfg: Cfg) -> Result<()> {
    let xu = XUtil::open(&cfg.options)?;
    let root = xu.root();
    for binding in cfg.key_bindings {
        bind(&xu, root, binding, true)?;
    }
    for binding in cfg.mouse_bindings {
        bind(&xu, root, binding, false)?;
    }
    tracing::info!("Bindings grabbed, listening");
    xu.run()
}

fn bind(xu: &XUtil, root: Window, binding: Binding, key: bool) -> Result<()> {
    let Binding {
        descriptor,
        on,
        action,
    } = binding;
    let handler = move |xu: &XUtil, _: &InputEvent| perform(xu, &action);
    let res = match (key, on) {
        (true, Trigger::Press) => xu.bind_key_press(root, &descriptor, handler),
        (true, Trigger::Release) => xu.bind_key_release(root, &descriptor, handler),
        (false, Trigger::Press) => xu.bind_button_press(root, &descriptor, handler),
        (false, Trigger::Release) => xu.bind_button_release(root, &descriptor, handler),
    };
    match res {
        // Someone else owns the combination, the rest still work
        Err(e @ Error::GrabConflict { .. }) => {
            tracing::warn!("{e}");
            Ok(())
        }
        res => res,
    }
}

fn perform(xu: &XUtil, action: &Action) {
    match action {
        Action::Quit => xu.quit(),
        Action::Spawn(command) => {
            let Some((bin, args)) = command.split_first() else {
                tracing::warn!("Spawn action without a program");
                return;
            };
            if let Err(e) = spawn::spawn(bin, args) {
                tracing::warn!("Failed to spawn {bin}: {e}");
            }
        }
    }
}
