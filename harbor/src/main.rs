use anyhow::Context;
use harbor::{apps, config, telemetry};
use harbor_net::TcpServer;
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    let config = config::load()?;
    telemetry::init(&config.log_filter);

    if let Err(errors) = config.validate() {
        for problem in &errors {
            error!("config: {problem}");
        }
        anyhow::bail!("invalid configuration");
    }
    info!(?config, "configuration loaded");

    let addr = config.bind_addr()?;
    let factory = apps::factory_for(&config.app)?;
    let server = TcpServer::new(addr, factory).context("creating server")?;
    server.serve().context("starting server")?;
    info!(
        addr = %server.local_addr().context("resolving bound address")?,
        "harbor serving"
    );

    // The reactor does the work on its own thread; nothing left to do here.
    loop {
        std::thread::park();
    }
}
