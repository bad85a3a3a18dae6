use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use mirror_core::types::{AccountId, Allowance, BookConfig, BookId, Side, TokenId, TokenMeta};
use mirror_core::{EventBus, MirrorConfig, NoticeLevel, Session};
use mirror_ledger::sim::{SimOrder, SimTrade};
use mirror_ledger::SimExchange;
use mirror_store::MirrorStore;
use mirror_sync::VaultSync;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (ignore if not found)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("mirror_sync=info".parse()?),
        )
        .init();

    info!("CLOB mirror starting...");

    let config = MirrorConfig::from_env();
    info!(
        floor_ms = config.cadence.floor.as_millis() as u64,
        ceiling_ms = config.cadence.ceiling.as_millis() as u64,
        depth = config.book_depth,
        recents = config.recent_trades,
        "Configuration loaded"
    );

    let bus = Arc::new(EventBus::new());
    let store = Arc::new(MirrorStore::new());
    let session = Arc::new(Session::new());

    // The remote ledger behind this demo binary is the in-memory simulator;
    // the engine itself only ever sees the connector traits.
    let (exchange, trader) = seed_exchange();
    session.sign_in(trader);

    // Forward notices and renders to the terminal in place of the toast and
    // page collaborators.
    spawn_notice_printer(&bus);
    spawn_render_counter(&bus);

    let vault = Arc::new(VaultSync::new(
        Arc::new(exchange.clone()),
        store.clone(),
        session.clone(),
        bus.clone(),
        config.clone(),
    ));

    // Shutdown on Ctrl+C
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received (Ctrl+C)");
        shutdown_tx.send(()).ok();
    });

    // Periodic status log
    let status_store = store.clone();
    let status_interval = config.status_interval_secs;
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(status_interval.max(1)));
        loop {
            interval.tick().await;
            info!(
                tokens = status_store.tokens.count(),
                books = status_store.books.count(),
                orders = status_store.orders.count(),
                trades = status_store.trades.count(),
                "Status"
            );
        }
    });

    let engine = tokio::spawn(vault.run());

    tokio::select! {
        _ = shutdown_rx.recv() => {
            info!("Shutting down...");
        }
        result = engine => {
            match result {
                Ok(Ok(())) => info!("Vault task finished"),
                Ok(Err(e)) => {
                    error!(error = %e, "Vault task failed");
                    std::process::exit(1);
                }
                Err(e) => error!(error = %e, "Vault task panicked"),
            }
        }
    }

    info!("CLOB mirror shutdown complete");
    Ok(())
}

/// Seed the simulator with two tokens, one book, a resting ladder of orders
/// and a little trade history, so every sync task has something to mirror.
/// Returns the exchange and the demo trader identity.
fn seed_exchange() -> (SimExchange, AccountId) {
    let exchange = SimExchange::new();
    let trader = AccountId::from_text("wqkx3-trade").expect("static identity");
    let counterparty = AccountId::from_text("mmkr2-desk").expect("static identity");

    let base = TokenId::new("cbtc-ledger");
    let quote = TokenId::new("usda-ledger");
    exchange.add_token(
        &base,
        TokenMeta {
            name: "Chain Bitcoin".into(),
            symbol: "cBTC".into(),
            decimals: 8,
            fee: 10,
        },
    );
    exchange.add_token(
        &quote,
        TokenMeta {
            name: "Dollar A".into(),
            symbol: "USDA".into(),
            decimals: 6,
            fee: 10_000,
        },
    );
    exchange.credit(&base, &trader, 500_000_000);
    exchange.credit(&quote, &trader, 250_000_000_000);
    exchange.grant_allowance(
        &quote,
        &trader,
        Allowance {
            amount: 50_000_000_000,
            expires_at: None,
        },
    );
    exchange.set_withdrawal_fee(&base, 10);
    exchange.set_withdrawal_fee(&quote, 10_000);
    exchange.set_unlocked(&base, &trader, 100_000_000);
    exchange.set_unlocked(&quote, &trader, 40_000_000_000);

    let book = BookId::new("cbtc-usda-book");
    exchange.add_book(
        &book,
        BookConfig {
            base: base.clone(),
            quote: quote.clone(),
            maker_fee_num: 10,
            taker_fee_num: 20,
            fee_denom: 10_000,
            close_fee_base: 100,
            close_fee_quote: 10_000,
        },
    );

    // a small resting ladder on both sides
    for (tier, price) in [64_000_000_000u128, 64_100_000_000, 64_200_000_000]
        .into_iter()
        .enumerate()
    {
        for _ in 0..=tier {
            exchange.insert_order(
                &book,
                SimOrder::open(Side::Sell, counterparty.clone(), price, 20_000_000),
            );
        }
    }
    for (tier, price) in [63_900_000_000u128, 63_800_000_000, 63_700_000_000]
        .into_iter()
        .enumerate()
    {
        for _ in 0..=tier {
            exchange.insert_order(
                &book,
                SimOrder::open(Side::Buy, counterparty.clone(), price, 15_000_000),
            );
        }
    }

    // one resting order and a couple of executions for the demo trader
    let trader_buy = exchange.insert_order(
        &book,
        SimOrder::open(Side::Buy, trader.clone(), 63_900_000_000, 30_000_000),
    );
    let resting_sell = exchange.insert_order(
        &book,
        SimOrder::open(Side::Sell, counterparty, 63_900_000_000, 30_000_000),
    );
    for step in 0..2u64 {
        exchange.insert_trade(
            &book,
            SimTrade {
                sell_id: resting_sell.0,
                buy_id: trader_buy.0,
                base: 5_000_000,
                quote: 3_195_000_000,
                sell_fee: 3_195_000,
                buy_fee: 5_000,
                executed_at: 1_700_000_000_000_000_000 + step,
                block: 40 + step,
            },
        );
    }
    exchange.set_order_fill(&book, trader_buy, 0, 10_000_000);
    exchange.set_actor(&trader);

    (exchange, trader)
}

fn spawn_notice_printer(bus: &Arc<EventBus>) {
    let mut notices = bus.subscribe_notices();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            match notice.level {
                NoticeLevel::Success => {
                    info!(title = %notice.title, detail = %notice.detail, "notice")
                }
                NoticeLevel::Error => {
                    error!(title = %notice.title, detail = %notice.detail, "notice")
                }
            }
        }
    });
}

/// Stand-in for the rendering collaborator: counts render signals so the
/// demo log shows when the mirrors changed without flooding it.
fn spawn_render_counter(bus: &Arc<EventBus>) {
    let mut render = bus.subscribe_render();
    tokio::spawn(async move {
        let mut renders: u64 = 0;
        loop {
            match render.recv().await {
                Ok(()) => {
                    renders += 1;
                    if renders.is_power_of_two() {
                        info!(renders, "mirror changed");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    renders += skipped;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
