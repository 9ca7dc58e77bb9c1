use std::sync::Arc;

use anyhow::{Context, bail};

use template_mailer::trace::TracingSink;
use template_mailer::transport::smtp::install_crypto_provider;
use template_mailer::{Mailer, MailerConfig, SubstitutionMap};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    install_crypto_provider();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(template) = args.next() else {
        eprintln!("Usage: template-mailer <template> [values.json]");
        eprintln!("  <template>     template file, or inline text containing a newline");
        eprintln!("  [values.json]  JSON object of substitution values");
        std::process::exit(2);
    };

    let values = match args.next() {
        Some(path) => {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading values from {path}"))?;
            let json: serde_json::Value =
                serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?;
            let Ok(values) = SubstitutionMap::try_from(json) else {
                bail!("{path} must contain a JSON object");
            };
            Some(values)
        }
        None => None,
    };

    let config = MailerConfig::from_env();
    if config.sendmail {
        eprintln!("   Transport: sendmail");
    } else {
        eprintln!("   Transport: smtp://{}:{}", config.host, config.port);
    }

    let mut mailer = Mailer::with_config(config);
    if std::env::var("MAILER_TRACE").is_ok() {
        mailer.attach_log_agent(Arc::new(TracingSink));
    }

    let outcome = mailer.send(template, values.as_ref()).await;
    for entry in &outcome.trace {
        eprintln!(
            "   [{}] {} {}",
            entry.metadata.level, entry.message, serde_json::Value::Object(entry.metadata.extra.clone())
        );
    }

    outcome.result.context("send failed")?;
    eprintln!("   Sent.");
    Ok(())
}
