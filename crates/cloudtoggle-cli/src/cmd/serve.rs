use crate::cmd::Context;
use anyhow::Result;
use cloudtoggle_core::runtime::Runtime;

pub fn run(ctx: &Context, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = ctx.load_config()?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    for w in config.validate() {
        tracing::warn!("config: {}", w.message);
    }

    let addr = config.server.bind_addr();
    let runtime = Runtime::open(config)?;
    let groups = runtime.groups.list_groups()?.len();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let actual = listener.local_addr()?;
        println!("cloudtoggle API on http://{actual}  ({groups} groups, PID {})", std::process::id());
        cloudtoggle_server::serve_on(runtime, listener).await
    })
}
