use crate::error::{self, Result};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tabled::{Alignment, Full, MaxWidth, MinWidth, Modify, Style, Table, Tabled};

/// The terminal state of a test or subtest.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    Pass,
    Fail,
    Timeout,
}

serde_plain::derive_display_from_serialize!(Outcome);

/// What kind of problem a [`Failure`] records.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// A step that the test could not continue past, e.g. a failed required command or an
    /// explicit fatal call. The (sub)test stopped here.
    Fatal,
    /// A problem the test reported and continued past.
    Error,
    /// The cluster had fewer machines than the test requires. The test was not invoked.
    InsufficientResources,
    /// The condition that must hold before the test may start was never met. The test was not
    /// invoked.
    Precondition,
    /// The test did not finish within its time limit.
    Timeout,
}

serde_plain::derive_display_from_serialize!(FailureKind);

/// One problem recorded against a test or subtest.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Clone)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new<S>(kind: FailureKind, message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl Display for Failure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// The result of a single test, with the results of its subtests nested underneath so that a
/// failed step can be told apart from a failed suite.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    /// The full name of the test, with subtest names joined by `/`.
    pub name: String,
    pub outcome: Outcome,
    pub duration: Duration,
    pub failures: Vec<Failure>,
    pub subtests: Vec<TestReport>,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Pass
    }

    /// Finds the report of this test or of a nested subtest by its full name.
    pub fn find(&self, name: &str) -> Option<&TestReport> {
        if self.name == name {
            return Some(self);
        }
        self.subtests.iter().find_map(|subtest| subtest.find(name))
    }

    /// The full names of this test and all nested subtests that did not pass, depth first.
    pub fn failed_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_failed(&mut names);
        names
    }

    fn collect_failed<'a>(&'a self, names: &mut Vec<&'a str>) {
        if !self.passed() {
            names.push(&self.name);
        }
        for subtest in &self.subtests {
            subtest.collect_failed(names);
        }
    }

    fn fmt_indented(&self, f: &mut Formatter<'_>, depth: usize) -> std::fmt::Result {
        let indent = "    ".repeat(depth);
        writeln!(
            f,
            "{}--- {}: {} ({:.2}s)",
            indent,
            self.outcome.to_string().to_uppercase(),
            self.name,
            self.duration.as_secs_f64()
        )?;
        for failure in &self.failures {
            writeln!(f, "{}        {}", indent, failure)?;
        }
        for subtest in &self.subtests {
            subtest.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl Display for TestReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.fmt_indented(f, 0)
    }
}

/// The per-test results of one dispatch, in the order the tests ran.
#[derive(Serialize, Deserialize, Debug, Default, Eq, PartialEq, Clone)]
pub struct DispatchReport {
    pub tests: Vec<TestReport>,
}

impl DispatchReport {
    /// `true` when every dispatched test passed. An empty dispatch passes.
    pub fn passed(&self) -> bool {
        self.tests.iter().all(TestReport::passed)
    }

    pub fn get(&self, name: &str) -> Option<&TestReport> {
        self.tests.iter().find_map(|test| test.find(name))
    }

    pub fn num_passed(&self) -> usize {
        self.tests.iter().filter(|test| test.passed()).count()
    }

    pub fn num_failed(&self) -> usize {
        self.tests.len() - self.num_passed()
    }

    /// Top-level tests that did not pass.
    pub fn failed(&self) -> impl Iterator<Item = &TestReport> {
        self.tests.iter().filter(|test| !test.passed())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self).context(error::ReportSerializationSnafu)?)
    }

    /// Create a table with one row per test and subtest.
    pub fn to_table_string(&self, width: usize) -> String {
        let table: Table = self.into();
        table
            .with(MaxWidth::truncating(width))
            .with(MinWidth::new(width))
            .to_string()
    }
}

impl Display for DispatchReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for test in &self.tests {
            write!(f, "{}", test)?;
        }
        writeln!(
            f,
            "{} passed, {} failed",
            self.num_passed(),
            self.num_failed()
        )
    }
}

impl From<&DispatchReport> for Table {
    fn from(report: &DispatchReport) -> Self {
        let mut rows = Vec::new();
        for test in &report.tests {
            push_rows(test, &mut rows);
        }
        Table::new(rows)
            .with(Style::blank())
            .with(Modify::new(Full).with(Alignment::left()))
    }
}

fn push_rows(report: &TestReport, rows: &mut Vec<ReportRow>) {
    rows.push(ReportRow {
        name: report.name.clone(),
        outcome: report.outcome.to_string(),
        duration: format!("{:.2}s", report.duration.as_secs_f64()),
        failures: report.failures.len(),
    });
    for subtest in &report.subtests {
        push_rows(subtest, rows);
    }
}

#[derive(Tabled, Default, Clone, Serialize)]
struct ReportRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "OUTCOME")]
    outcome: String,
    #[tabled(rename = "DURATION")]
    duration: String,
    #[tabled(rename = "FAILURES")]
    failures: usize,
}

#[cfg(test)]
mod test {
    use super::*;

    fn report(name: &str, outcome: Outcome, subtests: Vec<TestReport>) -> TestReport {
        TestReport {
            name: name.to_string(),
            outcome,
            duration: Duration::from_millis(10),
            failures: Vec::new(),
            subtests,
        }
    }

    fn sample() -> DispatchReport {
        DispatchReport {
            tests: vec![
                report(
                    "rkt.base",
                    Outcome::Fail,
                    vec![
                        report("rkt.base/cli", Outcome::Pass, vec![]),
                        report("rkt.base/unit", Outcome::Fail, vec![]),
                    ],
                ),
                report("coreos.tls.fetch-urls", Outcome::Pass, vec![]),
            ],
        }
    }

    #[test]
    fn counts_and_lookup() {
        let report = sample();
        assert!(!report.passed());
        assert_eq!(report.num_passed(), 1);
        assert_eq!(report.num_failed(), 1);
        assert_eq!(report.get("rkt.base/unit").unwrap().outcome, Outcome::Fail);
        assert_eq!(
            report.tests[0].failed_names(),
            vec!["rkt.base", "rkt.base/unit"]
        );
        assert!(DispatchReport::default().passed());
    }

    #[test]
    fn nested_display() {
        let mut report = sample();
        report.tests[0].subtests[1]
            .failures
            .push(Failure::new(FailureKind::Fatal, "journal missing output"));
        let text = report.to_string();
        assert!(text.contains("--- FAIL: rkt.base ("));
        assert!(text.contains("    --- PASS: rkt.base/cli ("));
        assert!(text.contains("fatal: journal missing output"));
        assert!(text.ends_with("1 passed, 1 failed\n"));
    }

    #[test]
    fn table_lists_subtests() {
        let table = sample().to_table_string(100);
        assert!(table.contains("NAME"));
        assert!(table.contains("rkt.base/cli"));
        assert!(table.contains("coreos.tls.fetch-urls"));
    }

    #[test]
    fn json_uses_camel_case() {
        let json = sample().to_json().unwrap();
        assert!(json.contains("\"outcome\": \"fail\""));
        assert!(json.contains("\"subtests\""));
    }
}
