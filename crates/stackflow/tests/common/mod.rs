use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::write(
            root.path().join("settings.yaml"),
            "region: eu-west-1\nretry:\n  initial_delay_ms: 1\nstabilize:\n  initial_delay_ms: 1\n",
        )
        .unwrap();
        Self { root }
    }

    pub fn write_template(&self, content: &str) {
        fs::write(self.root.path().join("stack.yaml"), content).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.root.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    #[allow(dead_code)]
    pub fn state_path(&self) -> PathBuf {
        self.root.path().join(".stackflow").join("stack.state.json")
    }

    #[allow(deprecated)]
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("stack").unwrap();
        cmd.current_dir(self.path())
            .env("STACKFLOW_CONFIG", self.root.path().join("settings.yaml"))
            .env("NO_COLOR", "1")
            .env_remove("STACK_TEMPLATE_PATH")
            .env_remove("STACKFLOW_STACK")
            .env_remove("STACKFLOW_STATE_DIR")
            .env_remove("STACKFLOW_REGION")
            .env_remove("RUST_LOG");
        cmd
    }
}
