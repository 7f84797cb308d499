use unirepo_server::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = Config::load()?;
    unirepo_server::start_server(config).await
}
