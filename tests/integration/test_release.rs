//! End-to-end release runs against real git remotes

use crate::helpers::{TestWorkspace, commit_message, git, pom, rev_parse, run_json, run_release_sync, write_script};
use anyhow::Result;

#[test]
fn test_marker_commit_releases_and_pushes_tag() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.add_project("core", "2.3.9-SNAPSHOT", true)?;
  let marker = ws.push_upstream("core", "CHANGES.md", "bump dependencies [release]")?;
  ws.write_config("")?;

  let report = run_json(&ws.path, &[])?;

  let repo = &report["repositories"][0];
  assert_eq!(repo["name"], "org.acme:core");
  assert_eq!(repo["status"], "released");
  assert_eq!(repo["plan"]["release_version"], "2.4.0");
  assert_eq!(repo["plan"]["tag"], "v2.4.0");
  assert_eq!(repo["plan"]["development_version"], "2.4.1-SNAPSHOT");
  assert_eq!(repo["forced_push"], false);

  assert_eq!(ws.remote_tags("core")?, vec!["v2.4.0"]);
  assert_eq!(ws.remote_tag_commit("core", "v2.4.0")?, marker);
  assert_eq!(rev_parse(&ws.checkout("core"), "HEAD")?, marker);

  Ok(())
}

#[test]
fn test_dependency_update_is_committed_tagged_and_pushed() -> Result<()> {
  let ws = TestWorkspace::new()?;
  let manifest = pom("core", "1.4.2-SNAPSHOT", false).replace(
    "</project>",
    "  <dependencies>\n    <dependency><groupId>org.acme</groupId><artifactId>bom</artifactId><version>1.0.0</version></dependency>\n  </dependencies>\n</project>",
  );
  let checkout = ws.add_repository("core", Some(&manifest))?;
  let before = rev_parse(&checkout, "HEAD")?;

  // stands in for versions:use-latest-releases finding a newer bom
  let mvn = write_script(
    &ws.path.join("bin").join("mvn"),
    r#"if [ "$1" = "versions:use-latest-releases" ]; then
  sed 's|<artifactId>bom</artifactId><version>1.0.0</version>|<artifactId>bom</artifactId><version>1.1.0</version>|' pom.xml > pom.xml.next
  mv pom.xml.next pom.xml
fi
"#,
  )?;
  ws.write_config_with_program(mvn.to_str().unwrap(), "")?;

  let report = run_json(&ws.path, &[])?;

  let repo = &report["repositories"][0];
  assert_eq!(repo["status"], "released");
  assert_eq!(repo["reason"]["kind"], "manifest_drift");
  assert_eq!(repo["plan"]["tag"], "v1.4.3");

  let head = rev_parse(&checkout, "HEAD")?;
  assert_ne!(head, before);
  assert_eq!(rev_parse(&checkout, "HEAD^")?, before);
  assert_eq!(commit_message(&checkout, "HEAD")?, "[release-sync] dependency update for v1.4.3");
  assert!(std::fs::read_to_string(checkout.join("pom.xml"))?.contains("<version>1.1.0</version>"));

  assert_eq!(ws.remote_head("core")?, head);
  assert_eq!(ws.remote_tag_commit("core", "v1.4.3")?, head);
  let status = git(&checkout, &["status", "--porcelain"])?;
  assert!(status.stdout.is_empty());

  Ok(())
}

#[test]
fn test_rejected_push_is_retried_with_force() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.add_project("core", "1.0.0-SNAPSHOT", false)?;
  let marker = ws.push_upstream("core", "CHANGES.md", "ship it [release]")?;
  // hooks run inside the bare repository; turn away the first push only
  ws.install_remote_hook(
    "core",
    "pre-receive",
    r#"echo attempt >> push-attempts
if [ ! -f rejected-once ]; then
  touch rejected-once
  echo "rejected by server policy" >&2
  exit 1
fi
"#,
  )?;
  ws.write_config("")?;

  let report = run_json(&ws.path, &[])?;

  let repo = &report["repositories"][0];
  assert_eq!(repo["status"], "released");
  assert_eq!(repo["forced_push"], true);

  let attempts = std::fs::read_to_string(ws.remote("core").join("push-attempts"))?;
  assert_eq!(attempts.lines().count(), 2);

  let head = rev_parse(&ws.checkout("core"), "HEAD")?;
  assert_eq!(head, marker);
  assert_eq!(ws.remote_head("core")?, head);
  assert_eq!(ws.remote_tag_commit("core", "v1.0.1")?, head);

  Ok(())
}

#[test]
fn test_nothing_new_is_up_to_date() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.add_project("core", "1.0.0-SNAPSHOT", false)?;
  let head = ws.push_upstream("core", "NOTES.md", "ordinary work")?;
  ws.write_config("")?;

  let report = run_json(&ws.path, &[])?;

  assert_eq!(report["repositories"][0]["status"], "up_to_date");
  assert!(ws.remote_tags("core")?.is_empty());
  // still synced to the new upstream head
  assert_eq!(rev_parse(&ws.checkout("core"), "HEAD")?, head);

  Ok(())
}

#[test]
fn test_fetch_reports_without_releasing() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.add_project("core", "1.2.9", true)?;
  let marker = ws.push_upstream("core", "CHANGES.md", "[release] please")?;
  ws.write_config("")?;

  let report = run_json(&ws.path, &["--fetch"])?;

  let repo = &report["repositories"][0];
  assert_eq!(report["mode"], "fetch");
  assert_eq!(repo["status"], "reported");
  assert_eq!(repo["decision"]["release"], true);
  assert_eq!(repo["decision"]["reason"]["kind"], "marker_commit");
  assert!(ws.remote_tags("core")?.is_empty());
  assert_eq!(ws.remote_head("core")?, marker);
  assert_eq!(rev_parse(&ws.checkout("core"), "HEAD")?, marker);

  Ok(())
}

#[test]
fn test_force_releases_without_trigger() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.add_project("core", "1.9.9", false)?;
  ws.write_config("")?;

  let report = run_json(&ws.path, &["--force"])?;

  let repo = &report["repositories"][0];
  assert_eq!(repo["status"], "released");
  assert_eq!(repo["plan"]["tag"], "v2.0.0");
  assert_eq!(repo["plan"]["development_version"], "2.0.1-SNAPSHOT");
  assert_eq!(ws.remote_tags("core")?, vec!["v2.0.0"]);

  Ok(())
}

#[test]
fn test_align_uses_registry_version() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.add_project("api", "1.0.0-SNAPSHOT", false)?;
  ws.add_project("core", "2.5.3-SNAPSHOT", true)?;

  ws.add_repository("registry", None)?;
  let seed = ws.seed("registry");
  for tag in ["v3.0.0", "v3.1.9", "nightly"] {
    git(&seed, &["tag", tag])?;
  }
  git(&seed, &["push", "origin", "--tags"])?;

  ws.write_config(&format!("\n[align]\nregistry = '{}'\n", ws.remote("registry").display()))?;

  let report = run_json(&ws.path, &["--align"])?;

  let repos = report["repositories"].as_array().unwrap();
  let released: Vec<_> = repos.iter().filter(|r| r["status"] == "released").collect();
  assert_eq!(released.len(), 2);
  for repo in released {
    assert_eq!(repo["plan"]["tag"], "v3.2.0");
  }
  assert_eq!(ws.remote_tags("api")?, vec!["v3.2.0"]);
  assert_eq!(ws.remote_tags("core")?, vec!["v3.2.0"]);

  Ok(())
}

#[test]
fn test_align_with_empty_registry_fails_the_batch() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.add_project("core", "1.0.0-SNAPSHOT", false)?;
  ws.add_repository("registry", None)?;
  ws.write_config(&format!("\n[align]\nregistry = '{}'\n", ws.remote("registry").display()))?;

  let output = crate::helpers::run_release_sync_unchecked(&ws.path, &["--align"])?;

  assert!(!output.status.success());
  assert!(String::from_utf8_lossy(&output.stderr).contains("no version tags"));
  assert!(ws.remote_tags("core")?.is_empty());

  Ok(())
}

#[test]
fn test_local_changes_are_discarded() -> Result<()> {
  let ws = TestWorkspace::new()?;
  let checkout = ws.add_project("core", "1.0.0-SNAPSHOT", false)?;
  std::fs::write(checkout.join("scratch.txt"), "leftover")?;
  std::fs::write(checkout.join("staged.txt"), "half done")?;
  git(&checkout, &["add", "staged.txt"])?;
  ws.write_config("")?;

  let report = run_json(&ws.path, &[])?;

  assert_eq!(report["repositories"][0]["status"], "up_to_date");
  assert!(!checkout.join("scratch.txt").exists());
  assert!(!checkout.join("staged.txt").exists());
  let status = git(&checkout, &["status", "--porcelain"])?;
  assert!(status.stdout.is_empty());

  Ok(())
}

#[test]
fn test_log_file_receives_events() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.add_project("core", "1.0.0-SNAPSHOT", false)?;
  let log = ws.path.join("logs").join("release-sync.log");
  ws.write_config("")?;
  // top-level keys must precede any table
  let config = std::fs::read_to_string(ws.path.join("release-sync.toml"))?;
  std::fs::write(
    ws.path.join("release-sync.toml"),
    format!("log_file = '{}'\n{}", log.display(), config),
  )?;

  run_release_sync(&ws.path, &[])?;

  let text = std::fs::read_to_string(&log)?;
  assert!(text.contains("release run finished"));
  assert!(!text.contains('\u{1b}'), "log file must not contain ANSI escapes");

  Ok(())
}

#[test]
fn test_missing_config_exits_non_zero() -> Result<()> {
  let ws = TestWorkspace::new()?;

  let output = crate::helpers::run_release_sync_unchecked(&ws.path, &[])?;

  assert_eq!(output.status.code(), Some(1));
  assert!(String::from_utf8_lossy(&output.stderr).contains("No release-sync configuration"));

  Ok(())
}
