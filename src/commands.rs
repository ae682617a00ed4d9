//! Command execution.

use crate::Commands;
use colored::Colorize;
use serde_json::Value;
use torctl_client::{ClientError, TorController};

/// Executes a command and returns the formatted output.
pub async fn execute(ctl: &TorController, cmd: Commands) -> Result<String, ClientError> {
    match cmd {
        Commands::CreatePool => {
            let result = ctl.create_tor_pool().await?;
            Ok(done("Created", "Tor pool", &result))
        }

        Commands::CreateSocksServer { port } => {
            let result = ctl.create_socks_server(port).await?;
            let what = format!("SOCKS server on port {}", ctl.socks_port());
            Ok(done("Created", &what, &result))
        }

        Commands::CreateInstances { count } => {
            let result = ctl.create_instances(count).await?;
            Ok(done("Created", &format!("{} instance(s)", count), &result))
        }

        Commands::CloseInstances => {
            let result = ctl.close_instances().await?;
            Ok(done("Closed", "all instances", &result))
        }

        Commands::Bootstrap {
            instances,
            socks_port,
        } => {
            let mut lines = Vec::new();

            let result = ctl.create_tor_pool().await?;
            lines.push(done("Created", "Tor pool", &result));

            let result = ctl.create_socks_server(socks_port).await?;
            let what = format!("SOCKS server on port {}", ctl.socks_port());
            lines.push(done("Created", &what, &result));

            let result = ctl.create_instances(instances).await?;
            lines.push(done("Created", &format!("{} instance(s)", instances), &result));

            Ok(lines.join("\n"))
        }
    }
}

fn done(verb: &str, what: &str, result: &Value) -> String {
    match result {
        Value::Null => format!("{} {}", verb.green(), what.cyan()),
        other => format!("{} {}\n{}", verb.green(), what.cyan(), format_json(other)),
    }
}

fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
