//! Scratch deployment for end-to-end runs
//!
//! Everything lives under one temp dir:
//! - `svc/`: fake conversion service (`/bin/sh` script) and its state files
//!   (`converted.txt`, `available.txt`, `archives/<ref>`, `calls.log`, ...)
//! - `gpg.sh`: fake decrypt command that copies input to output when the
//!   passphrase piped on stdin is `secret`
//! - `metadata/`: storage root holding record directories
//! - `stop`, `running`: sentinels

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use bkh_harvester::models::{RunReport, StepStatus};
use bkh_harvester::workflow::CatalogLookup;
use bkh_harvester::{HarvestOrchestrator, HarvesterConfig};

use super::fake_store::FakeStore;
use super::fixtures::write_package;

pub const TEMPLATE: &str = "Google_Books_Template";
pub const PASSPHRASE: &str = "secret";

const FAKE_SERVICE: &str = r#"
res=""
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --resource) res="$2"; shift 2 ;;
    -o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
echo "$res" >> "$SVC/calls.log"
case "$res" in
  _converted*)
    if [ -f "$SVC/converted.exit" ]; then
      echo "listing failed" >&2
      exit "$(cat "$SVC/converted.exit")"
    fi
    cat "$SVC/converted.txt" 2>/dev/null
    ;;
  _available*)
    cat "$SVC/available.txt" 2>/dev/null
    ;;
  _process*)
    if [ -f "$SVC/process.exit" ]; then
      exit "$(cat "$SVC/process.exit")"
    fi
    ;;
  *)
    if [ ! -f "$SVC/archives/$res" ]; then
      echo "download failed: $res" >&2
      exit 2
    fi
    cp "$SVC/archives/$res" "$out"
    if [ -f "$SVC/touch_after_download" ]; then
      touch "$(cat "$SVC/touch_after_download")"
    fi
    if [ -f "$SVC/remove_after_download" ]; then
      rm -f "$(cat "$SVC/remove_after_download")"
    fi
    ;;
esac
exit 0
"#;

const FAKE_GPG: &str = r#"
out=""
in=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift 2 ;;
    --decrypt) in="$2"; shift 2 ;;
    *) shift ;;
  esac
done
read -r pass
if [ "$pass" != "secret" ]; then
  echo "gpg: decryption failed: Bad session key" >&2
  exit 2
fi
cp "$in" "$out"
"#;

pub struct Harness {
    pub dir: TempDir,
    pub config: HarvesterConfig,
    pub store: Arc<FakeStore>,
}

impl Harness {
    /// Fresh deployment with a two-step template (Import OPEN, QA LOCKED)
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let svc = root.join("svc");
        std::fs::create_dir_all(svc.join("archives")).unwrap();
        std::fs::create_dir_all(root.join("metadata")).unwrap();

        let service_script = root.join("service.sh");
        std::fs::write(
            &service_script,
            format!("SVC=\"{}\"\n{}", svc.display(), FAKE_SERVICE),
        )
        .unwrap();
        let gpg_script = root.join("gpg.sh");
        std::fs::write(&gpg_script, FAKE_GPG).unwrap();

        let mut config = HarvesterConfig::default();
        config.storage_root = root.join("metadata");
        config.buffer = Some("1M".to_string());
        config.template_title = TEMPLATE.to_string();
        config.process_timeout_secs = 60;
        config.sentinels.stop_file = root.join("stop");
        config.sentinels.running_file = root.join("running");
        config.conversion.command = vec![
            "/bin/sh".to_string(),
            service_script.to_string_lossy().into_owned(),
        ];
        config.conversion.script_dir = svc.clone();
        config.decryption.command = vec![
            "/bin/sh".to_string(),
            gpg_script.to_string_lossy().into_owned(),
        ];
        config.decryption.passphrase = Some(PASSPHRASE.to_string());

        let store = Arc::new(FakeStore::new(root.join("metadata")));
        store.add_template(
            TEMPLATE,
            &[("Import", StepStatus::Open), ("QA", StepStatus::Locked)],
        );

        Self { dir, config, store }
    }

    pub fn svc(&self) -> PathBuf {
        self.dir.path().join("svc")
    }

    pub fn stop_file(&self) -> &Path {
        &self.config.sentinels.stop_file
    }

    pub fn running_file(&self) -> &Path {
        &self.config.sentinels.running_file
    }

    /// Lines the conversion service will list as converted
    pub fn set_converted(&self, references: &[&str]) {
        std::fs::write(self.svc().join("converted.txt"), lines(references)).unwrap();
    }

    pub fn set_available(&self, barcodes: &[&str]) {
        std::fs::write(self.svc().join("available.txt"), lines(barcodes)).unwrap();
    }

    pub fn fail_converted_listing(&self, exit_code: i32) {
        std::fs::write(self.svc().join("converted.exit"), exit_code.to_string()).unwrap();
    }

    pub fn fail_conversion_request(&self, exit_code: i32) {
        std::fs::write(self.svc().join("process.exit"), exit_code.to_string()).unwrap();
    }

    /// Create `path` as a side effect of every successful download
    pub fn touch_after_download(&self, path: &Path) {
        std::fs::write(
            self.svc().join("touch_after_download"),
            path.to_string_lossy().as_bytes(),
        )
        .unwrap();
    }

    /// Delete `path` (not recursive) as a side effect of every successful download
    pub fn remove_after_download(&self, path: &Path) {
        std::fs::write(
            self.svc().join("remove_after_download"),
            path.to_string_lossy().as_bytes(),
        )
        .unwrap();
    }

    /// Make `reference` downloadable with the given package entries
    pub fn add_package(&self, reference: &str, entries: &[(&str, &[u8])]) {
        write_package(&self.svc().join("archives").join(reference), entries);
    }

    /// Package with one page of every kind plus the given METS document
    pub fn add_book(&self, reference: &str, mets: &str) {
        self.add_package(
            reference,
            &[
                ("00000001.jp2", b"jp2 bytes"),
                ("00000001.html", b"<html>hocr</html>"),
                ("00000001.txt", b"page text"),
                ("book.xml", mets.as_bytes()),
            ],
        );
    }

    /// Resources requested from the conversion service, in order
    pub fn service_calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.svc().join("calls.log"))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn download_calls(&self) -> Vec<String> {
        self.service_calls()
            .into_iter()
            .filter(|c| !c.starts_with('_'))
            .collect()
    }

    pub fn orchestrator(&self) -> HarvestOrchestrator {
        self.orchestrator_with_catalog(None)
    }

    pub fn orchestrator_with_catalog(
        &self,
        catalog: Option<Arc<dyn CatalogLookup>>,
    ) -> HarvestOrchestrator {
        HarvestOrchestrator::new(self.config.clone(), self.store.clone(), catalog).unwrap()
    }

    pub async fn run(&self) -> RunReport {
        self.orchestrator().run_once().await
    }
}

fn lines(items: &[&str]) -> String {
    items.iter().map(|i| format!("{}\n", i)).collect()
}
