use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Serialize;
use stableswap_client::{
    amount::TokenAmount,
    chain::{ContractClient, EthersContractClient},
    cli::{self, AdminCommand, CONSOLE_HELP, Cli, Command, ConsoleCommand},
    config::AppConfig,
    models::{Direction, TOKEN_DECIMALS, Token},
    quote::QuoteEngine,
    session::SwapApp,
    utils::{self, SharedLines},
    wallet::{AccessPolicy, LocalWalletProvider, WalletConnector, WalletProvider},
};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    utils::init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "[INIT] command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load()?;
    tracing::info!(
        chain_id = config.chain_id,
        swap = ?config.swap_contract,
        rpc = %config.rpc_url,
        "[INIT] stableswap starting"
    );

    let console = SharedLines::stdin();
    let access = if cli.yes {
        AccessPolicy::AutoApprove
    } else {
        AccessPolicy::Prompt(console.clone())
    };
    let wallet = LocalWalletProvider::from_config(&config, access)?.map(Arc::new);
    let connector = WalletConnector::new(
        wallet
            .clone()
            .map(|w| w as Arc<dyn WalletProvider>),
    );
    let app = Arc::new(SwapApp::from_config(&config, connector));
    let json = cli.json;

    match cli.command {
        Command::Pool => {
            let client = EthersContractClient::read_only(&config)?;
            let pool = client.pool_balances().await?;
            emit(json, &pool, || cli::render_pool(&pool))?;
        }
        Command::Info => {
            let client = EthersContractClient::read_only(&config)?;
            let info = client.contract_info().await?;
            emit(json, &info, || cli::render_info(&info))?;
        }
        Command::Quote { amount, direction } => {
            let direction = Direction::from(direction);
            let input = TokenAmount::parse(&amount, TOKEN_DECIMALS)?;
            let client = EthersContractClient::read_only(&config)?;
            let engine = QuoteEngine::new(config.min_output);
            let quote = engine.get_quote(&client, direction, input).await?;
            let button = engine.swap_button(&quote, direction, &amount);
            emit(json, &quote, || {
                format!("{}\n{}", cli::render_quote(&quote, direction), button.label)
            })?;
        }
        Command::Balances { direction } => {
            app.set_direction(direction.into()).await;
            app.connect().await?;
            show(json, &app)?;
        }
        Command::Swap { amount, direction } => {
            app.set_direction(direction.into()).await;
            app.connect().await?;
            app.update_input(&amount).await?;
            let state = app.display();
            if !state.swap_button.enabled {
                show(json, &app)?;
                bail!("swap not allowed: {}", state.swap_button.label);
            }
            let result = app.submit_swap().await;
            show(json, &app)?;
            let outcome = result?;
            if !json {
                println!("{}", cli::render_receipt(&outcome.receipt));
            }
        }
        Command::Watch { direction } => {
            app.set_direction(direction.into()).await;
            app.connect().await?;
            watch(app, wallet, console, json).await?;
        }
        Command::Admin(admin) => {
            app.connect().await?;
            let client = app
                .session()
                .binding
                .context("wallet not bound after connect")?
                .client;
            let tx = match admin {
                AdminCommand::Fund { token, amount } => {
                    let token = Token::from(token);
                    let amount = TokenAmount::parse(&amount, token.decimals())?;
                    let owner = app.session().connected_address().context("wallet not bound")?;
                    let allowance = client.allowance(token, owner, client.swap_contract()).await?;
                    if allowance.raw() < amount.raw() {
                        let approval = client.approve(token, client.swap_contract(), amount).await?;
                        tracing::info!(?approval, "[CHAIN] waiting for funding approval");
                        client.wait_for_confirmation(approval).await?;
                    }
                    client.fund_pool(token, amount).await?
                }
                AdminCommand::Withdraw { token, amount } => {
                    let token = Token::from(token);
                    let amount = TokenAmount::parse(&amount, token.decimals())?;
                    client.withdraw(token, amount).await?
                }
                AdminCommand::Pause => client.set_paused(true).await?,
                AdminCommand::Unpause => client.set_paused(false).await?,
            };
            tracing::info!(?tx, "[CHAIN] admin transaction submitted");
            let receipt = client.wait_for_confirmation(tx).await?;
            emit(json, &receipt, || cli::render_receipt(&receipt))?;
        }
    }
    Ok(())
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}

fn show(json: bool, app: &SwapApp) -> Result<()> {
    let state = app.display();
    emit(json, &state, || cli::render(&state))
}

/// Interactive loop: re-render on every display change and read commands
/// from stdin until `quit`, end of input or Ctrl-C.
async fn watch(
    app: Arc<SwapApp>,
    wallet: Option<Arc<LocalWalletProvider>>,
    console: SharedLines,
    json: bool,
) -> Result<()> {
    let listener = app.spawn_account_listener();
    let refresher = app.spawn_refresh_watcher();
    let mut display = app.subscribe_display();

    show(json, &app)?;
    eprintln!("{CONSOLE_HELP}");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = display.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = display.borrow_and_update().clone();
                emit(json, &state, || cli::render(&state))?;
            }
            line = console.next_line() => {
                let Some(line) = line? else { break };
                let Some(command) = ConsoleCommand::parse(&line) else {
                    eprintln!("unknown command, try `help`");
                    continue;
                };
                match command {
                    ConsoleCommand::Amount(text) => {
                        let _ = app.update_input(&text).await;
                    }
                    ConsoleCommand::Toggle => app.toggle_direction().await,
                    ConsoleCommand::Swap => {
                        let app = Arc::clone(&app);
                        tokio::spawn(async move {
                            let _ = app.submit_swap().await;
                        });
                    }
                    ConsoleCommand::Refresh => app.refresh().await,
                    ConsoleCommand::Account(index) => match &wallet {
                        Some(w) => {
                            if let Err(e) = w.switch_account(index) {
                                eprintln!("{e}");
                            }
                        }
                        None => eprintln!("no wallet configured"),
                    },
                    ConsoleCommand::Revoke => {
                        if let Some(w) = &wallet {
                            w.revoke();
                        }
                    }
                    ConsoleCommand::Help => eprintln!("{CONSOLE_HELP}"),
                    ConsoleCommand::Quit => break,
                }
            }
        }
    }

    refresher.abort();
    if let Some(listener) = listener {
        listener.abort();
    }
    tracing::info!("[INIT] watch session ended");
    Ok(())
}
