//! Basic example: classify a handful of requests and review the log.
//!
//! A crawler visits twice within the dedupe window, a scanner probes a few
//! sensitive paths, and an ordinary visitor browses the site. Only the
//! classified, non-repeated events end up in the log.

use bot_insight::{BotInsight, EventFilter, RequestParts, ResponseOutcome};
use tracing::Level;

fn main() {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    let insight = BotInsight::open_in_memory().expect("in-memory store should open");

    println!("=== Bot Insight Example ===\n");

    let traffic = [
        (
            RequestParts::new("/")
                .with_peer_addr("66.249.66.1")
                .with_user_agent("Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)"),
            ResponseOutcome::default(),
        ),
        (
            RequestParts::new("/")
                .with_peer_addr("66.249.66.1")
                .with_user_agent("Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)"),
            ResponseOutcome::default(),
        ),
        (
            RequestParts::new("/.env")
                .with_peer_addr("203.0.113.50")
                .with_user_agent("Mozilla/5.0 zgrab/0.x"),
            ResponseOutcome::not_found(),
        ),
        (
            RequestParts::new("/index.php?id=1%27")
                .with_peer_addr("203.0.113.50")
                .with_user_agent("sqlmap/1.7.2#stable"),
            ResponseOutcome::with_status(500),
        ),
        (
            RequestParts::new("/products/shoes")
                .with_peer_addr("192.0.2.10")
                .with_user_agent("Mozilla/5.0 (X11; Linux x86_64) Firefox/126.0"),
            ResponseOutcome::default(),
        ),
    ];

    for (request, response) in traffic {
        let Some(pending) = insight.capture(&request) else {
            continue;
        };
        let outcome = insight.finalize(pending, response);
        println!("{:<22} -> {:?}", request.uri, outcome);
    }

    println!("\nLogged events (newest first):");
    for stored in insight.query(&EventFilter::all(), None).unwrap_or_default() {
        let event = &stored.event;
        println!(
            "  #{} {} {:<11} {:<7} {} {} {}",
            stored.id, event.created_at, event.subtype, event.risk_level, event.status, event.ip, event.path
        );
    }

    if let Ok(summary) = insight.summary() {
        println!(
            "\nSearch: {}  Risk: {}",
            summary.by_category.search, summary.by_category.risk
        );
    }

    let snapshot = insight.metrics().snapshot();
    println!(
        "Recorded: {}  Suppressed: {}  Unclassified: {}",
        snapshot.events_recorded, snapshot.events_suppressed, snapshot.events_unclassified
    );
}
