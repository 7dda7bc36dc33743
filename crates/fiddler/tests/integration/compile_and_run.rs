use fiddler::runner::{CompileError, PipelineError, Runner};
use fiddler::{OutputMode, Submission, SubmissionName, Synthesizer, TokioExecutor};

use super::{SkipLimits, fixture_code, test_config};

fn runner() -> Runner<TokioExecutor, SkipLimits> {
    Runner::with_parts(test_config(), TokioExecutor, SkipLimits)
}

#[tokio::test]
#[ignore = "requires a Skia fiddle install"]
async fn test_draw_circle_produces_output() {
    let runner = runner();
    let synth = Synthesizer::from_config(runner.config())
        .await
        .expect("Failed to load template");
    let submission = Submission::new(
        SubmissionName::new("itest_circle").unwrap(),
        fixture_code("draw_circle.cpp"),
    );

    let result = runner
        .run_submission(&synth, &submission, OutputMode::Capture)
        .await
        .expect("Fiddle failed");

    assert!(result.is_success());
    assert!(!result.stdout.unwrap_or_default().is_empty());
    assert!(result.stderr.is_empty());
}

#[tokio::test]
#[ignore = "requires a Skia fiddle install"]
async fn test_compile_error_is_reported() {
    let runner = runner();
    let synth = Synthesizer::from_config(runner.config())
        .await
        .expect("Failed to load template");
    let submission = Submission::new(
        SubmissionName::new("itest_broken").unwrap(),
        fixture_code("compile_error.cpp"),
    );

    let err = runner
        .run_submission(&synth, &submission, OutputMode::Capture)
        .await
        .expect_err("Compilation should fail");

    match err {
        PipelineError::Compile(CompileError::Failed { output, .. }) => {
            assert!(output.contains("nonexistentMethod"));
        }
        other => panic!("expected compile failure, got {other:?}"),
    }
}
