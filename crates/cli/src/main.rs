use clap::{Parser, Subcommand};
use cqm_core::{
    aggregate, flatten_results, parse_calculation_output, resolve_data_dir, statement_coverage,
    CalculationOutput, CalculationService, CoreConfig, ExecutionRun, ExecutionService, Measure,
    RecordedCalculator, TestCase, TestCaseService,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "cqm")]
#[command(about = "CQM test case workbench CLI")]
struct Cli {
    /// Data directory (defaults to CQM_DATA_DIR, then "cqm_data")
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Flatten engine output into per-statement counts
    Flatten {
        /// Engine output JSON file
        results: PathBuf,
    },
    /// Statement coverage of one group across all patients
    Coverage {
        /// Engine output JSON file
        results: PathBuf,
        /// Measure group id
        group_id: String,
    },
    /// Compare test case expectations with recorded engine output
    Execute {
        /// Measure JSON file
        measure: PathBuf,
        /// Test cases JSON file (a list, or the output of a previous run)
        test_cases: PathBuf,
        /// Engine output JSON file
        results: PathBuf,
    },
    /// Pass statistics for executed test cases
    Stats {
        /// Test cases JSON file (a list, or the output of a previous run)
        test_cases: PathBuf,
    },
    /// List a measure's stored test cases
    List {
        /// Measure id
        measure_id: String,
    },
    /// List the series names used by a measure's test cases
    Series {
        /// Measure id
        measure_id: String,
    },
}

/// Accepted shapes of a test cases file.
#[derive(Deserialize)]
#[serde(untagged)]
enum TestCasesFile {
    List(Vec<TestCase>),
    #[serde(rename_all = "camelCase")]
    Run {
        test_cases: Vec<TestCase>,
    },
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> CliResult<T> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let value = serde_json::from_str(&contents)
        .map_err(|e| format!("failed to parse {}: {}", path.display(), e))?;
    Ok(value)
}

fn read_test_cases(path: &Path) -> CliResult<Vec<TestCase>> {
    let test_cases = match read_json(path)? {
        TestCasesFile::List(test_cases) => test_cases,
        TestCasesFile::Run { test_cases } => test_cases,
    };
    Ok(test_cases)
}

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn test_case_service(data_dir: Option<PathBuf>) -> CliResult<TestCaseService> {
    let data_dir =
        data_dir.unwrap_or_else(|| resolve_data_dir(std::env::var("CQM_DATA_DIR").ok()));
    let cfg = Arc::new(CoreConfig::new(data_dir)?);
    Ok(TestCaseService::new(cfg))
}

fn read_calculation_output(path: &Path) -> CliResult<CalculationOutput> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let output = parse_calculation_output(&text)
        .map_err(|e| format!("error reading engine output: {}", e))?;
    Ok(output)
}

/// Runs the test cases in `test_cases` against the recorded engine output in `results`.
fn execute(measure: &Path, test_cases: &Path, results: &Path) -> CliResult<ExecutionRun> {
    let measure: Measure = read_json(measure)?;
    let mut test_cases = read_test_cases(test_cases)?;
    test_cases.iter_mut().for_each(TestCase::reset_status);

    let calculator = RecordedCalculator::from_file(results)?;
    let service = ExecutionService::new(CalculationService::new(Arc::new(calculator)));
    let run = service
        .execute_all(&measure, &test_cases)
        .map_err(|e| format!("error executing test cases: {}", e))?;
    Ok(run)
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Flatten { results }) => {
            let output = read_calculation_output(&results)?;
            print_json(&flatten_results(output.results.as_deref()))?;
        }
        Some(Commands::Coverage { results, group_id }) => {
            let output = read_calculation_output(&results)?;
            let flattened = flatten_results(output.results.as_deref());
            print_json(&statement_coverage(&flattened, &group_id))?;
        }
        Some(Commands::Execute {
            measure,
            test_cases,
            results,
        }) => {
            print_json(&execute(&measure, &test_cases, &results)?)?;
        }
        Some(Commands::Stats { test_cases }) => {
            let test_cases = read_test_cases(&test_cases)?;
            print_json(&aggregate(&test_cases))?;
        }
        Some(Commands::List { measure_id }) => {
            let service = test_case_service(cli.data_dir)?;
            let test_cases = service
                .get_test_cases_by_measure_id(&measure_id)
                .map_err(|e| format!("error listing test cases: {}", e))?;
            if test_cases.is_empty() {
                println!("No test cases found.");
            } else {
                print_json(&test_cases)?;
            }
        }
        Some(Commands::Series { measure_id }) => {
            let service = test_case_service(cli.data_dir)?;
            let series = service
                .get_test_case_series_for_measure(&measure_id)
                .map_err(|e| format!("error listing test case series: {}", e))?;
            print_json(&series)?;
        }
        None => {
            println!("No command given. Use --help for usage.");
        }
    }

    Ok(())
}
