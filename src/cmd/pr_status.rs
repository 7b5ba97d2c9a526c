//! One-shot PR status lookup: `taskdeck pr-status <url>`.

use anyhow::{Context, Result};
use console::style;

use taskdeck::config::TaskdeckConfig;
use taskdeck::manager::{GitHubPrFetcher, PrStatusFetcher, parse_pr_url};

pub async fn cmd_pr_status(config: &TaskdeckConfig, url: &str, json: bool) -> Result<()> {
    let pr = parse_pr_url(url)
        .with_context(|| format!("'{}' is not a pull request URL (expected https://<host>/<owner>/<repo>/pull/<n>)", url))?;
    let fetcher = GitHubPrFetcher::new(
        config.manager.api_base.clone(),
        config.manager.github_token.clone(),
    );
    let status = fetcher.fetch(&pr).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let field = |key: &str| status[key].as_str().unwrap_or("-").to_string();
    println!(
        "{} {} {}",
        style(pr.to_string()).bold(),
        style(field("status")).cyan(),
        field("title")
    );
    println!("  mergeable: {}", field("mergeable_state"));
    println!("  head:      {}", field("head_sha"));
    println!("  updated:   {}", field("updated_at"));
    Ok(())
}
