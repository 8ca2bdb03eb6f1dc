/// End-to-end tests of a batch run: render, dispatch, consolidate, clean up

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fmu_batch::{
    BatchError, BatchRun, CompileJob, JobOutcome, JobRunner, Layout, Result, RunConfig, Strategy,
};

/// Writes the expected artifact into the job's slot, like a well-behaved compiler.
struct ArtifactWriter {
    work_dir: PathBuf,
}

#[async_trait]
impl JobRunner for ArtifactWriter {
    async fn run(&self, job: &CompileJob) -> Result<JobOutcome> {
        let script = self.work_dir.join(&job.script_name);
        assert!(script.is_file(), "script written before dispatch");
        fs::write(self.work_dir.join(&job.slot_name).join(&job.artifact), b"fmu").unwrap();
        Ok(JobOutcome::succeeded())
    }
}

fn fmu_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_run_with_simulated_compiler() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::new(0, 5).parallelism(2).work_dir(dir.path());
    let layout = Layout::new(&config);

    let report = BatchRun::new(config.clone())
        .run_with(ArtifactWriter {
            work_dir: dir.path().to_path_buf(),
        })
        .await
        .unwrap();

    assert_eq!(report.jobs, 5);
    assert_eq!(report.dispatch.as_ref().map(|d| d.waves), Some(3));
    assert_eq!(report.artifacts.len(), 5);
    assert!(report.cleaned_up);

    let expected: Vec<String> = (0..5).map(|i| layout.artifact_name(i)).collect();
    assert_eq!(fmu_names(&layout.output_dir()), expected);
    for path in layout.intermediate_files() {
        assert!(!path.exists(), "{} left behind", path.display());
    }
    assert!(layout.slot_dirs().iter().all(|d| !d.exists()));
    assert!((0..5).all(|i| layout.staging_dir(i).is_dir()));
}

#[tokio::test]
async fn test_render_only_stops_before_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::new(0, 3).work_dir(dir.path());
    let layout = Layout::new(&config);

    let report = BatchRun::new(config.clone())
        .render_only(true)
        .run_with(ArtifactWriter {
            work_dir: dir.path().to_path_buf(),
        })
        .await
        .unwrap();

    assert!(report.dispatch.is_none());
    assert!(layout.intermediate_files().iter().all(|p| p.is_file()));
    assert!(layout.slot_dirs().iter().all(|d| !d.exists()));
    assert!(!layout.output_dir().exists());
}

#[tokio::test]
async fn test_invalid_config_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::new(3, 3).work_dir(dir.path());
    let result = BatchRun::new(config)
        .run_with(ArtifactWriter {
            work_dir: dir.path().to_path_buf(),
        })
        .await;
    assert!(matches!(result, Err(BatchError::InvalidConfig(_))));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_rerun_into_same_output_folder() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::new(0, 3).parallelism(2).work_dir(dir.path());
    let layout = Layout::new(&config);
    let run = BatchRun::new(config.clone());
    let writer = || ArtifactWriter {
        work_dir: dir.path().to_path_buf(),
    };

    run.run_with(writer()).await.unwrap();
    let report = run.run_with(writer()).await.unwrap();

    assert_eq!(report.artifacts.len(), 3);
    assert!(report.cleaned_up);
    let expected: Vec<String> = (0..3).map(|i| layout.artifact_name(i)).collect();
    assert_eq!(fmu_names(&layout.output_dir()), expected);
    assert!(layout.slot_dirs().iter().all(|d| !d.exists()));
    assert!(layout.intermediate_files().iter().all(|p| !p.exists()));
}

#[cfg(unix)]
mod with_processes {
    use super::*;

    /// A stand-in for the compiler: reads the model name from the compile
    /// script and writes `<package>_<model>.fmu` into the current directory.
    /// Fails for any model whose name ends in `robot3`.
    const STUB_COMPILER: &str = r#"#!/bin/sh
model=$(sed -n 's/^translateModelFMU(\([^,]*\),.*/\1/p' "$1")
case "$model" in
  *robot3) echo "translation of $model failed" >&2; exit 1 ;;
esac
echo "fmu" > "$(echo "$model" | tr '.' '_').fmu"
"#;

    /// Succeeds without producing anything, like a compiler reporting
    /// errors only on stdout.
    const SILENT_COMPILER: &str = "#!/bin/sh\necho \"Error: class not found\"\n";

    fn stub(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        format!("sh {}", path.display())
    }

    #[tokio::test]
    async fn test_real_processes_with_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        let config = RunConfig::new(0, 3)
            .parallelism(2)
            .work_dir(dir.path())
            .compiler(stub(tools.path(), "omc.sh", STUB_COMPILER));
        let layout = Layout::new(&config);

        let report = BatchRun::new(config.clone()).run().await.unwrap();
        assert_eq!(report.artifacts.len(), 3);
        assert_eq!(
            fmu_names(&layout.output_dir()),
            vec![
                "hpcom_tmp_fmu_one_robot0.fmu",
                "hpcom_tmp_fmu_one_robot1.fmu",
                "hpcom_tmp_fmu_one_robot2.fmu",
            ]
        );
        assert!(layout.slot_dirs().iter().all(|d| !d.exists()));
        assert!(layout.intermediate_files().iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn test_real_processes_without_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        let config = RunConfig::new(4, 7)
            .parallelism(2)
            .cleanup(false)
            .strategy(Strategy::Pool)
            .work_dir(dir.path())
            .compiler(stub(tools.path(), "omc.sh", STUB_COMPILER));
        let layout = Layout::new(&config);

        let report = BatchRun::new(config.clone()).run().await.unwrap();
        assert_eq!(report.artifacts.len(), 3);
        assert!(!report.cleaned_up);
        assert!(layout.intermediate_files().iter().all(|p| p.is_file()));
        assert!(layout.slot_dirs().iter().all(|d| d.is_dir()));
    }

    #[tokio::test]
    async fn test_failing_compiler_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        let config = RunConfig::new(0, 6)
            .parallelism(2)
            .work_dir(dir.path())
            .compiler(stub(tools.path(), "omc.sh", STUB_COMPILER));
        let layout = Layout::new(&config);

        let err = BatchRun::new(config.clone()).run().await.unwrap_err();
        match &err {
            BatchError::Dispatch { wave, failures } => {
                assert_eq!(*wave, Some(1));
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].index, 3);
                assert!(failures[0].reason.contains("translation of"), "{}", failures[0].reason);
            }
            other => panic!("expected dispatch failure, got {other:?}"),
        }

        // Wave 1 finished its sibling, wave 2 never started.
        assert!(layout.artifact_in_slot(0, 2).is_file());
        assert!(!layout.artifact_in_slot(0, 4).exists());
        // No consolidation, staging or cleanup after a failure.
        assert!(!layout.output_dir().exists());
        assert!(!layout.staging_root().exists());
        assert!(layout.intermediate_files().iter().all(|p| p.is_file()));
    }

    #[tokio::test]
    async fn test_zero_exit_without_fmu_fails() {
        let dir = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        let config = RunConfig::new(0, 2)
            .work_dir(dir.path())
            .compiler(stub(tools.path(), "omc.sh", SILENT_COMPILER));

        let err = BatchRun::new(config).run().await.unwrap_err();
        assert!(err.to_string().contains("hpcom_tmp_fmu_one_robot0.fmu"), "{err}");
    }

    #[tokio::test]
    async fn test_artifacts_from_failed_run_are_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        let config = RunConfig::new(2, 4)
            .parallelism(2)
            .work_dir(dir.path())
            .compiler(stub(tools.path(), "omc.sh", STUB_COMPILER));
        let layout = Layout::new(&config);

        // robot3 fails, robot2 is left behind in th0.
        BatchRun::new(config.clone()).run().await.unwrap_err();
        assert!(layout.artifact_in_slot(0, 2).is_file());

        let silent = config
            .clone()
            .compiler(stub(tools.path(), "silent.sh", SILENT_COMPILER));
        let err = BatchRun::new(silent).run().await.unwrap_err();
        match &err {
            BatchError::Dispatch { failures, .. } => {
                let indices: Vec<u32> = failures.iter().map(|f| f.index).collect();
                assert_eq!(indices, vec![2, 3]);
            }
            other => panic!("expected dispatch failure, got {other:?}"),
        }
        assert!(!layout.output_dir().exists());
    }
}
