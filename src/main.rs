//! Weather Agent - command line entry point
//!
//! Runs the example request and prints the agent's answer.

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weather_agent::{agent::Agent, config::Config};

const REQUEST: &str = "What is the weather like in London and in San Francisco, CA?";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the process environment is used as is.
    let _ = dotenvy::dotenv();

    // Logs go to stderr so stdout only carries the answer.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weather_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration: model={}", config.default_model);

    let agent = Agent::from_config(&config);
    let deps = config.deps();

    let result = agent.run(REQUEST, &deps).await?;

    println!("---");
    println!("Result:");
    println!("{}", result.answer.message);

    Ok(())
}
