//! Pure metric derivations over commit records and stored rows.

use chrono::{Days, Duration, NaiveDate};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tiermind_core::{FileHotspot, GitMetric, Stability, Trend, TrendDirection, Velocity};

use crate::git::CommitRecord;

/// An inclusive range of calendar days ending today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: u32,
}

impl Window {
    /// The `days` calendar days ending on `today` (inclusive), or `None`
    /// when the start would fall outside the representable date range.
    pub fn ending(today: NaiveDate, days: u32) -> Option<Self> {
        let days = days.max(1);
        let start = today.checked_sub_days(Days::new(u64::from(days) - 1))?;
        Some(Self {
            start,
            end: today,
            days,
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

#[derive(Default)]
struct DayAccumulator {
    commits: u32,
    added: u64,
    deleted: u64,
    files: BTreeSet<String>,
}

impl DayAccumulator {
    fn add(&mut self, commit: &CommitRecord) {
        self.commits += 1;
        for file in &commit.files {
            self.added += file.added;
            self.deleted += file.deleted;
            self.files.insert(file.path.clone());
        }
    }

    fn into_metric(self, date: NaiveDate, contributor: Option<String>) -> GitMetric {
        GitMetric {
            date,
            commits_count: self.commits,
            lines_added: self.added,
            lines_deleted: self.deleted,
            net_growth: self.added as i64 - self.deleted as i64,
            files_changed: self.files.len() as u32,
            contributor,
        }
    }
}

/// Aggregate and per-contributor rows for every day in `window` that has
/// commits. Both are ordered by date, contributors by name within a day.
pub fn daily_metrics(commits: &[CommitRecord], window: &Window) -> (Vec<GitMetric>, Vec<GitMetric>) {
    let mut days: BTreeMap<NaiveDate, DayAccumulator> = BTreeMap::new();
    let mut per_author: BTreeMap<(NaiveDate, String), DayAccumulator> = BTreeMap::new();

    for commit in commits {
        let date = commit.timestamp.date_naive();
        if !window.contains(date) {
            continue;
        }
        days.entry(date).or_default().add(commit);
        per_author
            .entry((date, commit.author.clone()))
            .or_default()
            .add(commit);
    }

    let aggregate = days
        .into_iter()
        .map(|(date, acc)| acc.into_metric(date, None))
        .collect();
    let contributors = per_author
        .into_iter()
        .map(|((date, author), acc)| acc.into_metric(date, Some(author)))
        .collect();
    (aggregate, contributors)
}

/// Churn per file over the commits in `window`, highest churn first.
pub fn file_hotspots(
    commits: &[CommitRecord],
    window: &Window,
    churn_low: f64,
    churn_high: f64,
) -> Vec<FileHotspot> {
    let in_window: Vec<&CommitRecord> = commits
        .iter()
        .filter(|c| window.contains(c.timestamp.date_naive()))
        .collect();
    let total = in_window.len() as u32;
    if total == 0 {
        return Vec::new();
    }

    // path -> (commits touching it, lines changed)
    let mut touched: HashMap<&str, (u32, u64)> = HashMap::new();
    for commit in &in_window {
        let mut seen = BTreeSet::new();
        for file in &commit.files {
            let entry = touched.entry(file.path.as_str()).or_default();
            if seen.insert(file.path.as_str()) {
                entry.0 += 1;
            }
            entry.1 += file.added + file.deleted;
        }
    }

    let mut hotspots: Vec<FileHotspot> = touched
        .into_iter()
        .map(|(path, (edits, lines))| {
            let churn_rate = (f64::from(edits) / f64::from(total)).clamp(0.0, 1.0);
            FileHotspot {
                file_path: path.to_string(),
                period_start: window.start,
                period_end: window.end,
                total_commits: total,
                file_edits: edits,
                churn_rate,
                stability: Stability::classify(churn_rate, churn_low, churn_high),
                lines_changed: lines,
            }
        })
        .collect();

    hotspots.sort_by(|a, b| {
        b.churn_rate
            .total_cmp(&a.churn_rate)
            .then_with(|| a.file_path.cmp(&b.file_path))
    });
    hotspots
}

/// Averages of aggregate rows over the window's calendar days.
pub fn velocity(metrics: &[GitMetric], days: u32) -> Velocity {
    let days = days.max(1);
    let n = f64::from(days);
    let mut v = Velocity {
        days,
        ..Velocity::default()
    };
    for m in metrics.iter().filter(|m| m.contributor.is_none()) {
        v.total_commits += u64::from(m.commits_count);
        v.avg_lines_added += m.lines_added as f64;
        v.avg_lines_deleted += m.lines_deleted as f64;
        v.avg_net_growth += m.net_growth as f64;
        v.avg_files_changed += f64::from(m.files_changed);
    }
    v.avg_commits_per_day = v.total_commits as f64 / n;
    v.avg_lines_added /= n;
    v.avg_lines_deleted /= n;
    v.avg_net_growth /= n;
    v.avg_files_changed /= n;
    v
}

/// Compare the most recent `days / 2` days against the half before.
/// With an odd window the oldest day belongs to neither half.
pub fn trend(metrics: &[GitMetric], window: &Window, noise: f64) -> (Trend, TrendDirection) {
    let half = i64::from(window.days / 2);
    if half == 0 {
        let flat = Trend {
            recent_avg_commits: 0.0,
            prior_avg_commits: 0.0,
            change: 0.0,
        };
        return (flat, TrendDirection::Stable);
    }

    let recent_start = window.end - Duration::days(half - 1);
    let prior_start = recent_start - Duration::days(half);

    let (mut recent, mut prior) = (0u64, 0u64);
    for m in metrics.iter().filter(|m| m.contributor.is_none()) {
        if m.date >= recent_start && m.date <= window.end {
            recent += u64::from(m.commits_count);
        } else if m.date >= prior_start && m.date < recent_start {
            prior += u64::from(m.commits_count);
        }
    }

    let recent_avg = recent as f64 / half as f64;
    let prior_avg = prior as f64 / half as f64;
    let change = if prior_avg > 0.0 {
        (recent_avg - prior_avg) / prior_avg
    } else if recent_avg > 0.0 {
        1.0
    } else {
        0.0
    };

    let direction = if change > noise {
        TrendDirection::Increasing
    } else if change < -noise {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };

    (
        Trend {
            recent_avg_commits: recent_avg,
            prior_avg_commits: prior_avg,
            change,
        },
        direction,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::FileChange;
    use chrono::{TimeZone, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn commit(d: u32, author: &str, files: &[(&str, u64, u64)]) -> CommitRecord {
        CommitRecord {
            hash: format!("{d}-{author}-{}", files.len()),
            author: author.into(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, d, 12, 0, 0).unwrap(),
            files: files
                .iter()
                .map(|(p, a, r)| FileChange {
                    path: (*p).into(),
                    added: *a,
                    deleted: *r,
                })
                .collect(),
        }
    }

    fn aggregate(date: NaiveDate, commits: u32) -> GitMetric {
        GitMetric {
            date,
            commits_count: commits,
            lines_added: 0,
            lines_deleted: 0,
            net_growth: 0,
            files_changed: 0,
            contributor: None,
        }
    }

    #[test]
    fn window_is_inclusive() {
        let w = Window::ending(day(30), 30).unwrap();
        assert_eq!(w.start, day(1));
        assert!(w.contains(day(1)));
        assert!(w.contains(day(30)));
        assert!(!w.contains(day(31)));
    }

    #[test]
    fn daily_rows_per_day_and_author() {
        let commits = vec![
            commit(2, "ada", &[("a.rs", 10, 2), ("b.rs", 1, 0)]),
            commit(2, "grace", &[("a.rs", 3, 3)]),
            commit(3, "ada", &[("c.rs", 0, 5)]),
        ];
        let (agg, per) = daily_metrics(&commits, &Window::ending(day(3), 7).unwrap());
        assert_eq!(agg.len(), 2);
        assert_eq!(agg[0].commits_count, 2);
        assert_eq!(agg[0].lines_added, 14);
        assert_eq!(agg[0].files_changed, 2);
        assert_eq!(agg[1].net_growth, -5);
        assert_eq!(per.len(), 3);
        assert_eq!(per[1].contributor.as_deref(), Some("grace"));
    }

    #[test]
    fn commits_outside_window_are_ignored() {
        let commits = vec![commit(1, "ada", &[("a.rs", 1, 0)])];
        let (agg, _) = daily_metrics(&commits, &Window::ending(day(10), 5).unwrap());
        assert!(agg.is_empty());
        assert!(file_hotspots(&commits, &Window::ending(day(10), 5).unwrap(), 0.1, 0.2).is_empty());
    }

    #[test]
    fn churn_is_fraction_of_commits() {
        let mut commits = Vec::new();
        for i in 0..10 {
            let mut files = vec![("noise.rs", 1, 0)];
            if i < 3 {
                files.push(("hot.rs", 5, 5));
            }
            commits.push(commit(1 + i, "ada", &files));
        }
        let spots = file_hotspots(&commits, &Window::ending(day(10), 10).unwrap(), 0.1, 0.2);
        assert_eq!(spots[0].file_path, "noise.rs");
        assert_eq!(spots[0].churn_rate, 1.0);
        let hot = spots.iter().find(|h| h.file_path == "hot.rs").unwrap();
        assert_eq!(hot.file_edits, 3);
        assert_eq!(hot.lines_changed, 30);
        assert_eq!(hot.stability, Stability::Unstable);
    }

    #[test]
    fn velocity_divides_by_calendar_days() {
        let metrics = vec![aggregate(day(1), 6), aggregate(day(5), 4)];
        let v = velocity(&metrics, 10);
        assert_eq!(v.total_commits, 10);
        assert!((v.avg_commits_per_day - 1.0).abs() < 1e-9);
    }

    #[test]
    fn trend_detects_drop() {
        let w = Window::ending(day(10), 10).unwrap();
        let metrics = vec![aggregate(day(2), 10), aggregate(day(8), 2)];
        let (t, dir) = trend(&metrics, &w, 0.1);
        assert!((t.prior_avg_commits - 2.0).abs() < 1e-9);
        assert!((t.recent_avg_commits - 0.4).abs() < 1e-9);
        assert!((t.change + 0.8).abs() < 1e-9);
        assert_eq!(dir, TrendDirection::Decreasing);
    }

    #[test]
    fn trend_from_zero_prior() {
        let w = Window::ending(day(10), 10).unwrap();
        let (t, dir) = trend(&[aggregate(day(9), 1)], &w, 0.1);
        assert_eq!(t.change, 1.0);
        assert_eq!(dir, TrendDirection::Increasing);

        let (t, dir) = trend(&[], &w, 0.1);
        assert_eq!(t.change, 0.0);
        assert_eq!(dir, TrendDirection::Stable);
    }

    #[test]
    fn small_changes_are_noise() {
        let w = Window::ending(day(10), 10).unwrap();
        let metrics = vec![aggregate(day(3), 10), aggregate(day(9), 10)];
        assert_eq!(trend(&metrics, &w, 0.1).1, TrendDirection::Stable);
    }

    #[test]
    fn odd_window_drops_oldest_day() {
        // 5-day window ending on the 10th: recent 9..10, prior 7..8, day 6 excluded
        let w = Window::ending(day(10), 5).unwrap();
        let (t, _) = trend(&[aggregate(day(6), 100)], &w, 0.1);
        assert_eq!(t.prior_avg_commits, 0.0);
        assert_eq!(t.recent_avg_commits, 0.0);
    }
}
