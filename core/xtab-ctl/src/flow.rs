//! The friction-gated disable flow.
//!
//! confirm → (attempt recorded) → snooze or permanent → countdown → commit.
//! Walking away at any step before the countdown completes leaves the feature
//! as it was. Only the attempt counter, recorded at confirmation, persists.

use std::future::Future;
use std::io::{self, BufRead, Write};
use std::time::Duration;
use tracing::info;

use xtab_core::{
    Countdown, CountdownStep, DisableGate, FeatureDescriptor, FeatureKey, FrictionEngine,
    SnoozeApplied, SnoozeDuration, PERMANENT_DISABLE_COUNTDOWN_SECS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableChoice {
    Snooze(SnoozeDuration),
    Permanent,
}

impl DisableChoice {
    fn countdown_secs(self) -> u64 {
        match self {
            DisableChoice::Snooze(duration) => duration.countdown_secs(),
            DisableChoice::Permanent => PERMANENT_DISABLE_COUNTDOWN_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStep {
    Confirm,
    Choice,
    Countdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowResult {
    AlreadyDisabled,
    Cancelled { at: FlowStep },
    Snoozed(SnoozeApplied),
    Disabled,
}

/// The UI for each gate.
pub trait Prompter {
    fn confirm(&mut self, title: &str, message: &str, attempts_today: u32) -> bool;
    fn choose(&mut self, feature: FeatureKey) -> Option<DisableChoice>;
    fn countdown_tick(&mut self, remaining: u64);
}

pub async fn run_disable_flow<P, C>(
    engine: &FrictionEngine,
    key: FeatureKey,
    prompter: &mut P,
    cancel: C,
) -> FlowResult
where
    P: Prompter,
    C: Future<Output = ()>,
{
    let outcome = engine.request_disable(key).await;
    let feature = outcome.token.feature();
    let DisableGate::Confirm {
        title,
        message,
        attempts_today,
    } = outcome.gate
    else {
        return FlowResult::AlreadyDisabled;
    };

    if !prompter.confirm(title, message, attempts_today) {
        info!(feature = %feature, "Disable abandoned at confirmation");
        return FlowResult::Cancelled {
            at: FlowStep::Confirm,
        };
    }
    let attempts = engine.confirm_disable_intent(feature).await;

    let Some(choice) = prompter.choose(feature) else {
        info!(feature = %feature, attempts, "Disable abandoned at choice");
        return FlowResult::Cancelled { at: FlowStep::Choice };
    };

    if !run_countdown(choice.countdown_secs(), prompter, cancel).await {
        info!(feature = %feature, attempts, "Disable abandoned during countdown");
        return FlowResult::Cancelled {
            at: FlowStep::Countdown,
        };
    }

    match choice {
        DisableChoice::Snooze(duration) => {
            FlowResult::Snoozed(engine.apply_snooze(feature, duration).await)
        }
        DisableChoice::Permanent => {
            engine.apply_permanent_disable(feature).await;
            FlowResult::Disabled
        }
    }
}

/// Ticks once per second. Returns false if `cancel` resolves first.
async fn run_countdown<P, C>(seconds: u64, prompter: &mut P, cancel: C) -> bool
where
    P: Prompter,
    C: Future<Output = ()>,
{
    if seconds == 0 {
        return true;
    }
    let mut countdown = Countdown::new(seconds);
    prompter.countdown_tick(countdown.remaining());

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;
    tokio::pin!(cancel);

    loop {
        tokio::select! {
            _ = ticker.tick() => match countdown.tick() {
                CountdownStep::Remaining(left) => prompter.countdown_tick(left),
                CountdownStep::Complete => return true,
                CountdownStep::Cancelled => return false,
            },
            _ = &mut cancel => {
                countdown.cancel();
                return false;
            }
        }
    }
}

/// Prompts on the terminal unless answers were supplied up front.
pub struct TerminalPrompter {
    assume_yes: bool,
    preset: Option<DisableChoice>,
}

impl TerminalPrompter {
    pub fn new(assume_yes: bool, preset: Option<DisableChoice>) -> Self {
        Self { assume_yes, preset }
    }

    fn ask(&self, prompt: &str) -> Option<String> {
        print!("{}", prompt);
        io::stdout().flush().ok()?;
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }
}

impl Prompter for TerminalPrompter {
    fn confirm(&mut self, title: &str, message: &str, attempts_today: u32) -> bool {
        println!("{}", title);
        println!("{}", message);
        if attempts_today > 0 {
            println!("Disable attempts today: {}", attempts_today);
        }
        if self.assume_yes {
            return true;
        }
        matches!(
            self.ask("Disable? [y/N] ").as_deref(),
            Some("y" | "Y" | "yes")
        )
    }

    fn choose(&mut self, feature: FeatureKey) -> Option<DisableChoice> {
        if let Some(choice) = self.preset {
            return Some(choice);
        }
        let label = FeatureDescriptor::of(feature).label;
        println!("How long should {} stay off?", label);
        for duration in SnoozeDuration::ALL {
            println!("  {:<9} {}", duration.code(), duration.label());
        }
        println!("  {:<9} permanently", "off");
        let answer = self.ask("Choice (blank to cancel): ")?;
        parse_choice(&answer)
    }

    fn countdown_tick(&mut self, remaining: u64) {
        print!("\rApplying in {:>3}s (Ctrl-C to cancel) ", remaining);
        let _ = io::stdout().flush();
    }
}

pub fn parse_choice(value: &str) -> Option<DisableChoice> {
    match value.trim() {
        "" => None,
        "off" | "permanent" => Some(DisableChoice::Permanent),
        code => code.parse().ok().map(DisableChoice::Snooze),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use std::sync::Arc;
    use xtab_core::{ManualClock, MemoryStore, SnoozeTimers, StorageAdapter};

    struct NoTimers;

    #[async_trait]
    impl SnoozeTimers for NoTimers {
        async fn arm(&self, _key: FeatureKey, _when: DateTime<Utc>) -> bool {
            true
        }
        async fn cancel(&self, _key: FeatureKey) {}
    }

    struct Scripted {
        confirm: bool,
        choice: Option<DisableChoice>,
        ticks: Vec<u64>,
    }

    impl Prompter for Scripted {
        fn confirm(&mut self, _title: &str, _message: &str, _attempts_today: u32) -> bool {
            self.confirm
        }
        fn choose(&mut self, _feature: FeatureKey) -> Option<DisableChoice> {
            self.choice
        }
        fn countdown_tick(&mut self, remaining: u64) {
            self.ticks.push(remaining);
        }
    }

    fn engine_with_home_enabled() -> (FrictionEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_values(
            [("homeRedirect".to_string(), json!(true))].into_iter().collect(),
        ));
        let engine = FrictionEngine::new(
            StorageAdapter::new(store.clone()),
            Arc::new(NoTimers),
            Arc::new(ManualClock::at("2024-01-01T12:00:00+00:00").unwrap()),
        );
        (engine, store)
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_disable_commits_after_five_second_countdown() {
        let (engine, store) = engine_with_home_enabled();
        let mut prompter = Scripted {
            confirm: true,
            choice: Some(DisableChoice::Permanent),
            ticks: Vec::new(),
        };

        let result =
            run_disable_flow(&engine, FeatureKey::Home, &mut prompter, std::future::pending()).await;

        assert_eq!(result, FlowResult::Disabled);
        assert_eq!(prompter.ticks, vec![5, 4, 3, 2, 1]);
        assert_eq!(store.snapshot()["homeRedirect"], json!(false));
        assert_eq!(store.snapshot()["disableAttempts"], json!(1));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_countdown_keeps_feature_but_counts_attempt() {
        let (engine, store) = engine_with_home_enabled();
        let mut prompter = Scripted {
            confirm: true,
            choice: Some(DisableChoice::Snooze(SnoozeDuration::OneHour)),
            ticks: Vec::new(),
        };

        let result = run_disable_flow(
            &engine,
            FeatureKey::Home,
            &mut prompter,
            tokio::time::sleep(Duration::from_millis(10_500)),
        )
        .await;

        assert_eq!(
            result,
            FlowResult::Cancelled {
                at: FlowStep::Countdown
            }
        );
        assert_eq!(store.snapshot()["homeRedirect"], json!(true));
        assert_eq!(store.snapshot()["disableAttempts"], json!(1));
        assert!(!store.snapshot().contains_key("snoozeEndTime"));
    }

    #[tokio::test]
    async fn declined_confirmation_counts_nothing() {
        let (engine, store) = engine_with_home_enabled();
        let mut prompter = Scripted {
            confirm: false,
            choice: None,
            ticks: Vec::new(),
        };

        let result =
            run_disable_flow(&engine, FeatureKey::Home, &mut prompter, std::future::pending()).await;

        assert_eq!(result, FlowResult::Cancelled { at: FlowStep::Confirm });
        assert!(!store.snapshot().contains_key("disableAttempts"));
    }

    #[tokio::test]
    async fn already_disabled_feature_skips_the_flow() {
        let store = Arc::new(MemoryStore::new());
        let engine = FrictionEngine::new(
            StorageAdapter::new(store),
            Arc::new(NoTimers),
            Arc::new(ManualClock::at("2024-01-01T12:00:00+00:00").unwrap()),
        );
        let mut prompter = Scripted {
            confirm: true,
            choice: Some(DisableChoice::Permanent),
            ticks: Vec::new(),
        };

        let result =
            run_disable_flow(&engine, FeatureKey::Explore, &mut prompter, std::future::pending())
                .await;
        assert_eq!(result, FlowResult::AlreadyDisabled);
    }

    #[test]
    fn choices_parse_from_snooze_codes() {
        assert_eq!(
            parse_choice("tomorrow"),
            Some(DisableChoice::Snooze(SnoozeDuration::UntilTomorrow))
        );
        assert_eq!(parse_choice("off"), Some(DisableChoice::Permanent));
        assert_eq!(parse_choice(""), None);
        assert_eq!(parse_choice("30"), None);
    }
}
