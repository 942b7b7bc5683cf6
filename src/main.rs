use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use coze_agent::cli::{parse_command, Command, USAGE};
use coze_agent::coze_api::{CallOptions, CozeApiError};
use coze_agent::{init_logging, AgentService, EnvConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let config = EnvConfig::load();
    if let Err(error) = init_logging(config.log_format) {
        eprintln!("failed to initialise logging: {error}");
    }

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let command = match parse_command(&args) {
        Ok(Command::Help) => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Ok(command) => command,
        Err(error) => {
            eprintln!("{error}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    let service = match AgentService::from_config(&config) {
        Ok(service) => service,
        Err(error) => {
            error!("failed to start: {error}");
            return ExitCode::FAILURE;
        }
    };

    let cancellation = Arc::new(AtomicBool::new(false));
    let ctrl_c = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; cancelling");
            ctrl_c.store(true, Ordering::SeqCst);
        }
    });
    let options = CallOptions::new().with_cancellation(cancellation);

    match run(&service, command, &options).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            error!("{error}");
            ExitCode::from(2)
        }
    }
}

/// Run one command and print its record. `Ok(false)` means the call completed
/// with an unsuccessful result.
async fn run(
    service: &AgentService,
    command: Command,
    options: &CallOptions,
) -> Result<bool, CozeApiError> {
    match command {
        Command::Send(request) => {
            let response = service.send_message(&request, options).await?;
            print_json(&response)?;
            Ok(response.success)
        }
        Command::Stream(request) => {
            let mut stream = service.open_stream(&request, options).await?;
            let mut failed = false;
            while let Some(event) = stream.next_event().await {
                failed |= event.is_error();
                println!("{}", serde_json::to_string(&event)?);
            }
            Ok(!failed)
        }
        Command::Merged(request) => {
            let response = service.send_stream_merged(&request, options).await?;
            print_json(&response)?;
            Ok(response.success)
        }
        Command::Retrieve {
            chat_id,
            conversation_id,
        } => {
            let result = service
                .retrieve_chat(&chat_id, &conversation_id, options)
                .await?;
            print_json(&result)?;
            Ok(result.success)
        }
        Command::Submit(request) => {
            let result = service.submit_tool_outputs(&request, options).await?;
            print_json(&result)?;
            Ok(result.success)
        }
        Command::Health => {
            let healthy = service.health_check(options).await;
            println!("{}", if healthy { "healthy" } else { "unhealthy" });
            Ok(healthy)
        }
        Command::Help => {
            println!("{USAGE}");
            Ok(true)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CozeApiError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
