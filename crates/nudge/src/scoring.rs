use chrono::{DateTime, Utc};

use crate::matching;
use crate::model::{Context, Hint, MatchExplanation, RankedHint, parse_timestamp};

const WEIGHT_FRECENCY: f64 = 0.30;
const WEIGHT_PRIORITY: f64 = 0.20;
const WEIGHT_CONFIDENCE: f64 = 0.20;
const WEIGHT_SPECIFICITY: f64 = 0.20;
const WEIGHT_RECENCY: f64 = 0.10;

/// Half-life horizon for the time decays: ~50% after 7 days.
const DECAY_HOURS: f64 = 7.0 * 24.0;

fn hours_since(now: DateTime<Utc>, then: DateTime<Utc>) -> f64 {
    ((now - then).num_seconds() as f64 / 3600.0).max(0.0)
}

/// Frequency-and-recency signal in `[0, 1]`.
///
/// Diminishing returns on `use_count`, decayed by time since last use.
/// An unused hint scores zero; a missing or malformed `last_used_at` skips
/// the decay rather than erroring.
pub fn frecency(use_count: u64, last_used_at: Option<&str>, now: DateTime<Utc>) -> f64 {
    if use_count == 0 {
        return 0.0;
    }
    let base = 1.0 - (-(use_count as f64) / 10.0).exp();
    match last_used_at.and_then(parse_timestamp) {
        Some(last_used) => base * (-hours_since(now, last_used) / DECAY_HOURS).exp(),
        None => base,
    }
}

/// Freshness of the entry itself, from `updated_at`. Malformed timestamps
/// degrade to a neutral 0.5.
pub fn recency(updated_at: &str, now: DateTime<Utc>) -> f64 {
    match parse_timestamp(updated_at) {
        Some(updated) => (-hours_since(now, updated) / DECAY_HOURS).exp(),
        None => 0.5,
    }
}

/// Blend the five weighted components into one score in `[0, 1]`.
pub fn score_hint(hint: &Hint, now: DateTime<Utc>) -> f64 {
    let frecency = frecency(hint.use_count, hint.last_used_at.as_deref(), now);
    let priority = hint.meta.priority.map_or(0.5, |p| f64::from(p) / 10.0);
    let confidence = hint.meta.confidence.unwrap_or(0.5);
    let specificity =
        (matching::count_specificity(hint.meta.scope.as_ref()) as f64 / 5.0).min(1.0);
    let recency = recency(&hint.updated_at, now);

    WEIGHT_FRECENCY * frecency
        + WEIGHT_PRIORITY * priority
        + WEIGHT_CONFIDENCE * confidence
        + WEIGHT_SPECIFICITY * specificity
        + WEIGHT_RECENCY * recency
}

fn round2(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

fn usage_phrase(last_used: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = now - last_used;
    let secs = delta.num_seconds().max(0);
    let days = delta.num_days();
    if secs < 300 {
        format!("recently used ({}m ago)", secs / 60)
    } else if secs < 3600 {
        format!("used {} minutes ago", secs / 60)
    } else if days == 0 {
        format!("used {} hours ago", secs / 3600)
    } else if days == 1 {
        "used yesterday".to_string()
    } else {
        format!("used {days} days ago")
    }
}

/// Build the human-readable explanation: the matcher's reasons plus
/// humanized provenance (usage recency and count, notable priority and
/// confidence). The reported score is rounded to two decimals; ordering
/// keeps full precision.
pub fn explain_match(
    hint: &Hint,
    score: f64,
    match_reasons: Vec<String>,
    now: DateTime<Utc>,
) -> MatchExplanation {
    let mut reasons = match_reasons;

    if hint.use_count > 0 {
        if let Some(last_used) = hint.last_used_at.as_deref().and_then(parse_timestamp) {
            reasons.push(usage_phrase(last_used, now));
        }
        let plural = if hint.use_count == 1 { "" } else { "s" };
        reasons.push(format!("used {} time{plural}", hint.use_count));
    }

    if let Some(priority) = hint.meta.priority {
        if priority >= 8 {
            reasons.push(format!("high priority ({priority}/10)"));
        }
    }
    if let Some(confidence) = hint.meta.confidence {
        if confidence >= 0.8 {
            reasons.push(format!("high confidence ({confidence:.1})"));
        }
    }

    MatchExplanation {
        matched: true,
        score: round2(score),
        reasons,
    }
}

/// Rank `(component, key, hint)` triples against a context.
///
/// Ineligible hints are dropped; the rest are scored and sorted by
/// descending score. The sort is stable, so equal scores keep the store's
/// insertion order.
pub fn rank(hints: Vec<(String, String, Hint)>, context: &Context) -> Vec<RankedHint> {
    let now = Utc::now();
    let mut matches: Vec<RankedHint> = hints
        .into_iter()
        .filter_map(|(component, key, hint)| {
            let (eligible, match_reasons) = matching::is_eligible(&hint, context);
            if !eligible {
                return None;
            }
            let score = score_hint(&hint, now);
            let match_explain = explain_match(&hint, score, match_reasons, now);
            Some(RankedHint {
                component,
                key,
                hint,
                score,
                match_explain,
            })
        })
        .collect();

    matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HintMeta, HintValue, Scope, now_iso};
    use chrono::Duration;

    fn hint_with_meta(meta: HintMeta) -> Hint {
        Hint::new(HintValue::from("test"), meta)
    }

    fn iso(dt: DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
    }

    #[test]
    fn unused_hint_has_zero_frecency() {
        let now = Utc::now();
        assert_eq!(frecency(0, None, now), 0.0);
        assert_eq!(frecency(0, Some(&now_iso()), now), 0.0);
    }

    #[test]
    fn frecency_grows_with_use_and_decays_with_time() {
        let now = Utc::now();
        let fresh = frecency(5, Some(&iso(now)), now);
        let more_uses = frecency(20, Some(&iso(now)), now);
        assert!(more_uses > fresh);

        let stale = frecency(5, Some(&iso(now - Duration::days(14))), now);
        assert!(stale < fresh);

        // Malformed last_used_at keeps the undecayed base.
        let base = 1.0 - (-0.5f64).exp();
        assert!((frecency(5, Some("garbage"), now) - base).abs() < 1e-9);
    }

    #[test]
    fn recency_defaults_on_malformed_timestamp() {
        let now = Utc::now();
        assert_eq!(recency("not a timestamp", now), 0.5);
        assert!(recency(&iso(now), now) > 0.99);
        let week_old = recency(&iso(now - Duration::days(7)), now);
        assert!((week_old - (-1.0f64).exp()).abs() < 0.01);
    }

    #[test]
    fn score_defaults_to_midpoints() {
        // No usage, default priority/confidence, no scope, fresh update:
        // 0.30*0 + 0.20*0.5 + 0.20*0.5 + 0.20*0 + 0.10*~1.0
        let hint = hint_with_meta(HintMeta::default());
        let score = score_hint(&hint, Utc::now());
        assert!((score - 0.30).abs() < 0.01);
    }

    #[test]
    fn score_stays_in_unit_interval() {
        let now = Utc::now();
        let mut hint = hint_with_meta(HintMeta {
            priority: Some(10),
            confidence: Some(1.0),
            scope: Some(Scope {
                env_required: Some(vec!["A".into(), "B".into(), "C".into(), "D".into(), "E".into()]),
                ..Default::default()
            }),
            ..Default::default()
        });
        hint.use_count = 1000;
        hint.last_used_at = Some(iso(now));
        let score = score_hint(&hint, now);
        assert!(score <= 1.0);
        assert!(score > 0.95);
    }

    #[test]
    fn ranking_prefers_priority_and_usage() {
        let now = Utc::now();
        let mut high = hint_with_meta(HintMeta {
            priority: Some(9),
            ..Default::default()
        });
        high.use_count = 5;
        high.last_used_at = Some(iso(now - Duration::hours(1)));
        let low = hint_with_meta(HintMeta {
            priority: Some(5),
            ..Default::default()
        });

        let ranked = rank(
            vec![
                ("c".into(), "low".into(), low),
                ("c".into(), "high".into(), high),
            ],
            &Context::default(),
        );
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].key, "high");
        assert!(ranked[0].score > ranked[1].score);
        let reasons = &ranked[0].match_explain.reasons;
        assert!(reasons.contains(&"high priority (9/10)".to_string()));
        assert!(reasons.contains(&"used 1 hours ago".to_string()));
        assert!(reasons.contains(&"used 5 times".to_string()));
    }

    #[test]
    fn ranking_drops_ineligible_hints() {
        let scoped = hint_with_meta(HintMeta {
            scope: Some(Scope {
                branch: Some(vec!["main".into()]),
                ..Default::default()
            }),
            ..Default::default()
        });
        let ctx = Context {
            branch: Some("feature".into()),
            ..Default::default()
        };
        let ranked = rank(vec![("c".into(), "k".into(), scoped)], &ctx);
        assert!(ranked.is_empty());
    }

    #[test]
    fn equal_scores_keep_insertion_order() {
        let a = hint_with_meta(HintMeta::default());
        let b = hint_with_meta(HintMeta::default());
        let ranked = rank(
            vec![
                ("c".into(), "first".into(), a),
                ("c".into(), "second".into(), b),
            ],
            &Context::default(),
        );
        assert_eq!(ranked[0].key, "first");
        assert_eq!(ranked[1].key, "second");
    }

    #[test]
    fn usage_phrases() {
        let now = Utc::now();
        assert_eq!(usage_phrase(now - Duration::minutes(2), now), "recently used (2m ago)");
        assert_eq!(usage_phrase(now - Duration::minutes(30), now), "used 30 minutes ago");
        assert_eq!(usage_phrase(now - Duration::hours(5), now), "used 5 hours ago");
        assert_eq!(usage_phrase(now - Duration::days(1), now), "used yesterday");
        assert_eq!(usage_phrase(now - Duration::days(3), now), "used 3 days ago");
    }

    #[test]
    fn explanation_rounds_reported_score() {
        let hint = hint_with_meta(HintMeta::default());
        let explain = explain_match(&hint, 0.30123, vec!["no scope restrictions".into()], Utc::now());
        assert_eq!(explain.score, 0.30);
        assert!(explain.matched);
        assert_eq!(explain.reasons, vec!["no scope restrictions"]);
    }

    #[test]
    fn explanation_singular_use_count() {
        let mut hint = hint_with_meta(HintMeta::default());
        hint.use_count = 1;
        let explain = explain_match(&hint, 0.5, Vec::new(), Utc::now());
        assert!(explain.reasons.contains(&"used 1 time".to_string()));
    }
}
