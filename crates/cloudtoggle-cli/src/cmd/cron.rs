use crate::cmd::Context;
use crate::output::print_json;
use cloudtoggle_core::scheduler::{parse_timezone, CronSpec};

/// Print the normalized expression for `spec` and its next `count` fire
/// times, both in UTC and in the scheduler timezone.
pub fn run(ctx: &Context, spec: &str, count: usize, timezone: Option<&str>) -> anyhow::Result<()> {
    let tz = match timezone {
        Some(name) => parse_timezone(name)?,
        None => ctx.load_config()?.scheduler.timezone()?,
    };
    let cron = CronSpec::parse(spec)?;

    let mut upcoming = Vec::with_capacity(count);
    let mut after = chrono::Utc::now();
    while upcoming.len() < count {
        let Some(next) = cron.next_after(after, tz) else {
            break;
        };
        upcoming.push(next);
        after = next;
    }

    if ctx.json {
        let value = serde_json::json!({
            "expression": cron.expression(),
            "timezone": tz.name(),
            "next": upcoming.iter().map(|t| t.to_rfc3339()).collect::<Vec<_>>(),
        });
        return print_json(&value);
    }

    println!("{}", cron.expression());
    for t in &upcoming {
        println!(
            "  {}  ({} {})",
            t.to_rfc3339(),
            t.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S"),
            tz.name()
        );
    }
    Ok(())
}
