use tenantgate_infra::GateConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tenantgate_observability::init();

    let config = GateConfig::from_env()?;
    if config.operator_key.is_none() {
        tracing::warn!("OPERATOR_KEY not set; tenant provisioning is disabled");
    }

    let bind_addr = config.bind_addr;
    let app = tenantgate_api::app::build_app(config).await?;

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
