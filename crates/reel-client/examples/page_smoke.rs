/// Smoke-test for `BrowserPage`.
///
/// Launches a headless Chromium, opens <https://example.com>, waits for the
/// page-ready gate, and resolves the heading through the default guard.
///
/// Run with:
///   cargo run -p reel-client --example page_smoke
use reel_client::{BrowserOptions, BrowserPage};
use reel_core::fields::{Candidate, FieldSpec};
use reel_core::guard::PageGuard;
use reel_core::models::FieldName;
use reel_core::resolver::resolve_field;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    println!("Launching headless browser…");
    let page = BrowserPage::launch(BrowserOptions::default()).await?;
    let guard = PageGuard::default();

    let url = "https://example.com";
    println!("Opening {url} …");
    guard.navigate(&page, url).await?;
    let readiness = guard.wait_until_ready(&page, Some("h1")).await?;
    println!("Ready: {readiness}");

    let title = FieldSpec::new(
        FieldName::Title,
        vec![Candidate::text("h1.missing"), Candidate::text("h1")],
    );
    let outcome = resolve_field(&guard, &page, &title).await?;

    assert_eq!(
        outcome.value.as_deref(),
        Some("Example Domain"),
        "Expected <h1> text not resolved"
    );
    assert_eq!(outcome.matched_candidate, Some(1));

    println!("OK: resolved title {:?} from candidate 1", outcome.value);
    Ok(())
}
