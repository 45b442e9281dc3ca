use assert_cmd::Command;
use predicates::prelude::*;

const AS_OF: &str = "2024-06-15T12:00:00Z";

const HISTORY: &str = r#"{
    "dividends": {
        "KO": [
            { "date": "2023-06-14", "amount": 0.46 },
            { "date": "2023-09-29", "amount": 0.46 },
            { "date": "2023-12-14", "amount": 0.46 },
            { "date": "2024-03-14", "amount": 0.485 },
            { "date": "2024-06-14", "amount": 0.485 }
        ],
        "MSFT": [
            { "date": "2024-03-14T09:00:00-05:00", "amount": 0.75 }
        ]
    },
    "prices": { "KO": 60 }
}"#;

const PORTFOLIO: &str = r#"{
    "KO": 100,
    "MSFT": { "shares": 10, "cost_per_share": 300 },
    "NOPE": 5
}"#;

struct Fixture {
    home: tempfile::TempDir,
}

impl Fixture {
    fn new(history: &str, portfolio: &str) -> Self {
        let home = tempfile::tempdir().expect("tempdir");
        std::fs::write(home.path().join("history.json"), history).unwrap();
        std::fs::write(home.path().join("portfolio.json"), portfolio).unwrap();
        Self { home }
    }

    fn path(&self, name: &str) -> String {
        self.home.path().join(name).to_str().unwrap().to_string()
    }

    fn forecast(&self, extra: &[&str]) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("dividendero"));
        cmd.env("DIVIDENDERO_HOME", self.home.path());
        cmd.env_remove("RUST_LOG");
        let portfolio = self.path("portfolio.json");
        let history = self.path("history.json");
        cmd.args([
            "forecast",
            "--portfolio",
            portfolio.as_str(),
            "--history",
            history.as_str(),
            "--as-of",
            AS_OF,
        ]);
        cmd.args(extra);
        cmd
    }
}

fn stdout_of(cmd: &mut Command) -> String {
    let out = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(out).expect("utf8 stdout")
}

#[test]
fn schedule_is_projected_and_sorted() {
    let fx = Fixture::new(HISTORY, PORTFOLIO);
    let out = stdout_of(&mut fx.forecast(&["--rate", "0.9", "--format", "tsv"]));

    let rows: Vec<&str> = out
        .lines()
        .skip(1)
        .take_while(|l| !l.starts_with("month\t"))
        .filter(|l| !l.is_empty())
        .collect();
    assert_eq!(
        rows,
        vec![
            "KO\t2024-09-29\t100\t0.46\t46.00\t41.40",
            "KO\t2024-12-14\t100\t0.46\t46.00\t41.40",
            "KO\t2025-03-14\t100\t0.49\t48.50\t43.65",
            "MSFT\t2025-03-14\t10\t0.75\t7.50\t6.75",
            "KO\t2025-06-14\t100\t0.49\t48.50\t43.65",
        ]
    );
}

#[test]
fn totals_and_taxes_per_year() {
    let fx = Fixture::new(HISTORY, PORTFOLIO);
    let out = stdout_of(&mut fx.forecast(&["--rate", "0.9", "--format", "tsv"]));

    assert!(out.contains("March 2025\t56.00\t50.40"));
    assert!(out.contains("2024\t92.00\t82.80"));
    assert!(out.contains("2025\t104.50\t94.05"));
    assert!(out.contains("2024\t82.80\t15.73\t67.07"));
    assert!(out.contains("2025\t94.05\t17.87\t76.18"));
}

#[test]
fn table_output_groups_by_month() {
    let fx = Fixture::new(HISTORY, PORTFOLIO);
    let out = stdout_of(&mut fx.forecast(&["--rate", "0.9"]));

    assert!(out.contains("Dividend Payment Schedule"));
    assert!(out.contains("\nSeptember 2024\n"));
    assert!(out.contains("\nMarch 2025\n"));
    assert!(out.contains("Yearly Tax Calculations"));
    assert!(!out.contains("Investment Summary"));
}

#[test]
fn unavailable_instrument_is_reported_and_skipped() {
    let fx = Fixture::new(HISTORY, PORTFOLIO);
    fx.forecast(&["--rate", "0.9", "--format", "tsv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("NOPE").not())
        .stderr(predicate::str::contains("NOPE"));
}

#[test]
fn roi_uses_cost_and_market_price() {
    let fx = Fixture::new(HISTORY, PORTFOLIO);
    let out = stdout_of(&mut fx.forecast(&["--rate", "0.9", "--roi"]));

    assert!(out.contains("Total Investment: 9000.00 USD | 8100.00 EUR"));
    assert!(out.contains("Yearly Return on Investment"));
    assert!(out.contains("1.02%"));
}

#[test]
fn missing_rate_aborts_before_output() {
    let fx = Fixture::new(HISTORY, PORTFOLIO);
    fx.forecast(&["--rate", "0"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Failed to obtain USD/EUR rate"));
}

#[test]
fn malformed_history_aborts_the_run() {
    let bad = r#"{ "dividends": { "KO": [{ "date": "2024/03/14", "amount": 0.485 }] } }"#;
    let fx = Fixture::new(bad, PORTFOLIO);
    fx.forecast(&["--rate", "0.9"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("malformed date"));
}

#[test]
fn empty_history_prints_empty_schedule() {
    let fx = Fixture::new(r#"{ "dividends": {} }"#, PORTFOLIO);
    let out = stdout_of(&mut fx.forecast(&["--rate", "0.9"]));
    assert!(out.contains("(no payments)"));
}

#[test]
fn duplicate_ticker_in_portfolio_fails_cleanly() {
    let fx = Fixture::new(HISTORY, r#"{ "ko": 1, "KO": 2 }"#);
    fx.forecast(&["--rate", "0.9"])
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("KO is listed more than once"));
}

#[test]
fn lowercase_history_keys_match_portfolio() {
    let history = r#"{ "dividends": { "ko": [{ "date": "2024-03-14", "amount": 0.5 }] } }"#;
    let fx = Fixture::new(history, r#"{ "KO": 10 }"#);
    let out = stdout_of(&mut fx.forecast(&["--rate", "1", "--format", "tsv"]));
    assert!(out.contains("KO\t"));
}

#[test]
fn oversized_amount_fails_without_panicking() {
    let history = r#"{ "dividends": { "KO": [
        { "date": "2024-03-14", "amount": "79228162514264337593543950335" }
    ] } }"#;
    let fx = Fixture::new(history, r#"{ "KO": 100 }"#);
    fx.forecast(&["--rate", "0.9"])
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("amount out of range"));
}
