use anyhow::Result;
use wordgate::cli::{actions::Action, start};

#[tokio::main]
async fn main() -> Result<()> {
    let action = start()?;

    match action {
        Action::Server(args) => wordgate::cli::actions::server::execute(args).await?,
    }

    Ok(())
}
