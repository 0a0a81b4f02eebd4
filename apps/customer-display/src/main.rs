//! # Customer Display Entry Point
//!
//! Mirrors a terminal's cart onto a customer-facing screen.
//!
//! ## Startup Sequence
//! 1. Initialize tracing (logging)
//! 2. Load display config (`display.toml` + `TALLY_*` environment)
//! 3. Connect to the terminal hub (reconnects with backoff)
//! 4. Fold incoming events into the view and render every change
//! 5. Stop on Ctrl+C

use tally_display::{DisplayConfig, DisplaySubscriber, DisplayTransport, DisplayView};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tally_display=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = DisplayConfig::load_or_default(None);
    info!(
        display_id = %config.display.id,
        store_id = %config.store.id,
        hub = %config.hub.url,
        "Starting customer display"
    );

    let (transport, events) = DisplayTransport::spawn(config.transport_config(), config.hello());
    let (subscriber, mut view) = DisplaySubscriber::new(config.dwell());
    let folding = tokio::spawn(subscriber.run(events));

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    warn!("Display feed closed");
                    break;
                }
                render(&view.borrow_and_update());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down customer display");
                break;
            }
        }
    }

    transport.shutdown().await?;
    folding.abort();
    Ok(())
}

fn render(view: &DisplayView) {
    match view {
        DisplayView::Idle => println!("\n  Welcome!\n"),
        DisplayView::Building { cart } => {
            println!();
            for line in &cart.items {
                println!("  {:<28} {:>10}", line.name, line.total_price.to_string());
            }
            println!("  {:<28} {:>10}", "Subtotal", cart.subtotal.to_string());
            println!("  {:<28} {:>10}", "Tax", cart.tax.to_string());
            println!("  {:<28} {:>10}", "TOTAL", cart.total.to_string());
        }
        DisplayView::PaymentPending { payment, .. } => {
            println!("\n  Amount due: {} ({})\n", payment.amount_due, payment.method);
        }
        DisplayView::Completed { completed } => {
            println!("\n  Thank you! Paid {}", completed.order.total);
            if let Some(change) = completed.change {
                println!("  Change: {change}");
            }
            println!("  Receipt {}\n", completed.order.receipt_number);
        }
    }
}
