//! `optrade clock`: show which bucket the engine is in right now.

use anyhow::Result;
use chrono::NaiveTime;
use chrono_tz::Tz;
use clap::Args;
use optrade_core::clock::{local_now, until, IntervalClock};

/// Arguments for the clock command.
#[derive(Args, Debug, Clone)]
pub struct ClockArgs {
    /// Bucket width in minutes
    #[arg(short, long)]
    pub interval: u32,

    /// Session anchor (HH:MM:SS)
    #[arg(long, default_value = "09:15:00")]
    pub anchor: NaiveTime,

    /// Exchange timezone
    #[arg(long, default_value = "Asia/Kolkata")]
    pub timezone: Tz,
}

/// Runs the clock command.
///
/// # Errors
/// Returns an error if the interval is zero.
pub fn run_clock(args: &ClockArgs) -> Result<()> {
    let clock = IntervalClock::new(args.interval, args.anchor)?;
    let now = local_now(args.timezone);
    let buckets = clock.buckets(now);

    println!("now      {}", now.format("%Y-%m-%d %H:%M:%S"));
    match buckets.current {
        Some(current) => println!("current  {}", current.format("%Y-%m-%d %H:%M")),
        None => println!("current  - (before the {} anchor)", args.anchor),
    }
    println!(
        "next     {} (in {}s)",
        buckets.next.format("%Y-%m-%d %H:%M"),
        until(buckets.next, now).as_secs()
    );
    Ok(())
}
