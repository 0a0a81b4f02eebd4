//! # Tally Terminal
//!
//! Headless checkout lane driven from stdin. Serves the customer display
//! hub and settles against the local SQLite store.
//!
//! ## Usage
//! ```bash
//! # Seed a database, then run a lane against it
//! cargo run -p tally-db --bin seed -- --db ./tally_dev.db
//! TALLY_DB_PATH=./tally_dev.db cargo run -p tally-engine --bin tally-terminal
//! ```
//!
//! ## Startup Sequence
//! 1. Load terminal config (file + environment)
//! 2. Initialize tracing
//! 3. Connect to the database & run migrations
//! 4. Start the display hub
//! 5. Read commands until `quit` or end of input

use std::sync::Arc;

use tally_core::numpad::NumpadKey;
use tally_core::{ItemKey, Money, NumpadMode, PaymentMethod, ReservationFilter, StockTransfer};
use tally_db::{Database, SqliteStore, StockStore};
use tally_display::{DisplayHub, DisplayPublisher};
use tally_engine::{
    init_tracing, CheckoutStep, EngineResult, NumpadOutcome, TerminalConfig, TerminalSession, TransferService,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

const HELP: &str = "\
commands:
  scan <product> [variant]     add a product
  remove <item>                remove a line
  clear                        empty the cart
  qty|weight|price <item>      open a numpad capture for a line
  key <digits or .>            type on the numpad
  back                         numpad backspace
  enter                        commit the numpad
  esc                          cancel the numpad
  pay cash|card                select a payment method
  cancel                       cancel the checkout
  retry                        retry a failed settlement
  return                       leave a failed settlement, keep the cart
  holds <order>                list stock holds for an order
  cleanup                      persist expired holds
  transfer <from> <to> <qty>   move stock between products
  show                         print the cart
  quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = TerminalConfig::load_or_default(None);
    init_tracing();

    info!(store_id = %config.store.id, "Starting Tally terminal");

    let db = Database::new(config.db_config()?).await?;
    let store: Arc<dyn StockStore> = Arc::new(SqliteStore::new(db));

    let publisher = DisplayPublisher::with_source(config.display.terminal_id.clone());
    let hub = DisplayHub::new(config.hub_config(), publisher.clone()).start().await?;
    info!(url = %hub.ws_url(), "Customer displays can connect");

    let mut session = TerminalSession::from_config(&config, store, publisher);
    let transfers = TransferService::new(session.client().clone());

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.first() == Some(&"quit") {
            break;
        }
        if let Err(err) = run_command(&mut session, &transfers, &words).await {
            let notice = err.notice();
            error!(code = ?notice.code, "{}", notice.message);
            println!("! {notice}");
        }
    }

    hub.shutdown().await?;
    info!("Terminal stopped");
    Ok(())
}

async fn run_command(session: &mut TerminalSession, transfers: &TransferService, words: &[&str]) -> EngineResult<()> {
    match words {
        [] => {}
        ["scan", product] => {
            session.scan(product, None).await?;
        }
        ["scan", product, variant] => {
            session.scan(product, Some(*variant)).await?;
        }
        ["remove", item] => {
            session.remove_item(item)?;
        }
        ["clear"] => session.clear_cart()?,
        [mode @ ("qty" | "weight" | "price"), item] => {
            let mode = match *mode {
                "qty" => NumpadMode::Quantity,
                "weight" => NumpadMode::Weight,
                _ => NumpadMode::Price,
            };
            session.open_numpad(mode, Some(item.to_string()))?;
        }
        ["key", keys] => {
            for c in keys.chars() {
                let key = match c.to_digit(10) {
                    Some(d) => NumpadKey::Digit(d as u8),
                    None if c == '.' => NumpadKey::Decimal,
                    None => continue,
                };
                session.press_key(key)?;
            }
        }
        ["back"] => {
            session.press_key(NumpadKey::Backspace)?;
        }
        ["enter"] => match session.commit_numpad().await? {
            NumpadOutcome::CartUpdated(_) => {}
            NumpadOutcome::Paid(receipt) => {
                println!(
                    "paid: receipt {} total {} change {}",
                    receipt.order.receipt_number,
                    receipt.order.total,
                    receipt.change.unwrap_or(Money::zero())
                );
            }
        },
        ["esc"] => session.cancel_numpad()?,
        ["pay", method] => {
            let method = if *method == "cash" {
                PaymentMethod::Cash
            } else {
                PaymentMethod::ExternalCard
            };
            match session.select_payment(method).await? {
                CheckoutStep::AwaitingCash { amount_due } => println!("cash due: {amount_due}"),
                CheckoutStep::Completed(receipt) => println!("paid: receipt {}", receipt.order.receipt_number),
            }
        }
        ["cancel"] => {
            let released = session.cancel_checkout().await?;
            println!("cancelled, {released} hold(s) released");
        }
        ["retry"] => {
            let receipt = session.retry_settlement().await?;
            println!("paid: receipt {}", receipt.order.receipt_number);
        }
        ["return"] => session.return_to_cart().await?,
        ["holds", order] => {
            for hold in session
                .client()
                .list_reservations(ReservationFilter::for_order(*order))
                .await?
            {
                println!("{} {} x{} {:?} until {}", hold.id, hold.item, hold.quantity, hold.status, hold.expires_at);
            }
        }
        ["cleanup"] => {
            let expired = session.client().cleanup_expired().await?;
            println!("{expired} hold(s) expired");
        }
        ["transfer", from, to, quantity] => {
            let request = StockTransfer {
                from: Some(ItemKey::product(*from)),
                to: Some(ItemKey::product(*to)),
                quantity: quantity.parse().unwrap_or(0),
                notes: None,
            };
            let receipt = transfers.transfer(&request).await?;
            println!("transfer {} done", receipt.transfer_id);
        }
        ["show"] => print_cart(session),
        ["help"] => println!("{HELP}"),
        _ => println!("unknown command, try `help`"),
    }
    Ok(())
}

fn print_cart(session: &TerminalSession) {
    println!("checkout: {}", session.checkout().state_name());
    for line in session.cart().cart().items() {
        println!("  {:<24} {:<20} {}", line.name, line.display, line.total_price);
    }
    match session.cart().calculation() {
        Some(calc) => println!("  subtotal {}  tax {}  total {}", calc.subtotal, calc.tax, calc.total),
        None => println!("  (no active order)"),
    }
    if let Some(numpad) = session.numpad() {
        println!("  numpad {:?}: {}", numpad.mode(), numpad.buffer());
    }
}
