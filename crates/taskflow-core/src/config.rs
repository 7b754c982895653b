use std::collections::BTreeMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow,
  bail
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::view::{
  SortMode,
  StatusFilter
};

const RC_ENV_VAR: &str = "TASKFLOWRC";
const RC_FILE_NAME: &str =
  ".taskflowrc";
const DEFAULT_DATA_DIR: &str =
  "~/.taskflow";

const KEY_DATA_LOCATION: &str =
  "data.location";
const KEY_COLOR: &str = "color";
const KEY_DEFAULT_FILTER: &str =
  "default.filter";
const KEY_DEFAULT_SORT: &str =
  "default.sort";
const KEY_STORAGE_RECOVER: &str =
  "storage.recover";
const KEY_TIMEZONE: &str = "timezone";

const KNOWN_KEYS: [&str; 6] = [
  KEY_DATA_LOCATION,
  KEY_COLOR,
  KEY_DEFAULT_FILTER,
  KEY_DEFAULT_SORT,
  KEY_STORAGE_RECOVER,
  KEY_TIMEZONE
];

/// Settings from the rc file, any files
/// it includes, and command-line
/// overrides, in that order of
/// precedence (last wins).
#[derive(Debug, Clone)]
pub struct Config {
  settings: BTreeMap<String, String>,
  loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let settings = [
      (KEY_DATA_LOCATION, DEFAULT_DATA_DIR),
      (KEY_COLOR, "on"),
      (KEY_DEFAULT_FILTER, "all"),
      (KEY_DEFAULT_SORT, "deadline"),
      (KEY_STORAGE_RECOVER, "on")
    ]
    .into_iter()
    .map(|(key, value)| {
      (key.to_string(), value.to_string())
    })
    .collect();

    Self {
      settings,
      loaded_files: Vec::new()
    }
  }
}

/// One meaningful line of an rc file.
#[derive(Debug, PartialEq, Eq)]
enum RcLine<'a> {
  Include(&'a str),
  Setting { key: &'a str, value: &'a str }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    match locate_rc_file(rc_override) {
      | Some(path) => {
        info!(rc = %path.display(), "loading taskflowrc");
        cfg.read_rc(&path, &mut Vec::new())?;
      }
      | None => {
        debug!(
          "no taskflowrc found; using \
           defaults"
        );
      }
    }

    Ok(cfg)
  }

  /// Accepts `rc.KEY` as well as `KEY`.
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (raw_key, value) in overrides {
      let key = raw_key
        .strip_prefix("rc.")
        .unwrap_or(&raw_key);
      debug!(key, value = %value, "applying override");
      self.set(key, &value);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<&str> {
    self
      .settings
      .get(key)
      .map(String::as_str)
  }

  /// Sorted by key.
  pub fn entries(
    &self
  ) -> impl Iterator<Item = (&str, &str)>
  {
    self
      .settings
      .iter()
      .map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn loaded_files(&self) -> &[PathBuf] {
    &self.loaded_files
  }

  pub fn color(
    &self
  ) -> anyhow::Result<bool> {
    self.switch(KEY_COLOR, true)
  }

  pub fn recover_corrupt(
    &self
  ) -> anyhow::Result<bool> {
    self.switch(KEY_STORAGE_RECOVER, true)
  }

  pub fn timezone(&self) -> Option<&str> {
    self
      .get(KEY_TIMEZONE)
      .filter(|tz| !tz.trim().is_empty())
  }

  pub fn default_filter(
    &self
  ) -> StatusFilter {
    self
      .get(KEY_DEFAULT_FILTER)
      .map(StatusFilter::parse_lenient)
      .unwrap_or_default()
  }

  /// `None` keeps stored order.
  pub fn default_sort(
    &self
  ) -> Option<SortMode> {
    self
      .get(KEY_DEFAULT_SORT)
      .and_then(SortMode::parse_lenient)
  }

  /// The `--data` flag wins over
  /// `data.location`. The directory is
  /// not created here; the store does
  /// that when it opens.
  pub fn data_dir(
    &self,
    override_dir: Option<&Path>
  ) -> PathBuf {
    if let Some(dir) = override_dir {
      return dir.to_path_buf();
    }
    let location = self
      .get(KEY_DATA_LOCATION)
      .filter(|raw| !raw.trim().is_empty())
      .unwrap_or(DEFAULT_DATA_DIR);
    expand_tilde(location.trim())
  }

  fn set(&mut self, key: &str, value: &str) {
    if !KNOWN_KEYS.contains(&key) {
      warn!(key, "unknown config key");
    }
    self
      .settings
      .insert(key.to_string(), value.to_string());
  }

  fn switch(
    &self,
    key: &str,
    default: bool
  ) -> anyhow::Result<bool> {
    match self.get(key) {
      | None => Ok(default),
      | Some(raw) => {
        parse_switch(raw).ok_or_else(|| {
          anyhow!(
            "invalid value for {key}: \
             {raw:?} (expected on or off)"
          )
        })
      }
    }
  }

  /// `chain` holds the files currently
  /// being read, outermost first, so an
  /// include that points back into it is
  /// a cycle. Diamond includes are fine.
  #[tracing::instrument(skip(
    self, chain
  ))]
  fn read_rc(
    &mut self,
    path: &Path,
    chain: &mut Vec<PathBuf>
  ) -> anyhow::Result<()> {
    let canonical =
      fs::canonicalize(path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    if chain.contains(&canonical) {
      let cycle = chain
        .iter()
        .chain(std::iter::once(&canonical))
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ");
      bail!("include cycle: {cycle}");
    }

    let text =
      fs::read_to_string(&canonical)
        .with_context(|| {
          format!(
            "failed to read {}",
            canonical.display()
          )
        })?;
    self
      .loaded_files
      .push(canonical.clone());
    chain.push(canonical.clone());

    let base_dir = canonical
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_default();

    for (idx, raw_line) in
      text.lines().enumerate()
    {
      let line = parse_rc_line(raw_line)
        .with_context(|| {
          format!(
            "{}:{}",
            canonical.display(),
            idx + 1
          )
        })?;

      match line {
        | None => {}
        | Some(RcLine::Setting {
          key,
          value
        }) => {
          trace!(key, value, "loaded config key");
          self.set(key, value);
        }
        | Some(RcLine::Include(target)) => {
          let target = base_dir
            .join(expand_tilde(target));
          if target.exists() {
            self.read_rc(&target, chain)?;
          } else {
            warn!(include = %target.display(), "include file does not exist; skipping");
          }
        }
      }
    }

    chain.pop();
    Ok(())
  }
}

/// `--taskflowrc`, then `TASKFLOWRC`
/// (`/dev/null` turns the rc file off),
/// then `~/.taskflowrc` when present.
fn locate_rc_file(
  rc_override: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = rc_override {
    return Some(path.to_path_buf());
  }

  if let Ok(raw) =
    std::env::var(RC_ENV_VAR)
  {
    return (raw != "/dev/null")
      .then(|| PathBuf::from(raw));
  }

  let candidate =
    dirs::home_dir()?.join(RC_FILE_NAME);
  candidate.exists().then_some(candidate)
}

fn parse_rc_line(
  raw: &str
) -> anyhow::Result<Option<RcLine<'_>>>
{
  let line = raw
    .split_once('#')
    .map_or(raw, |(before, _)| before)
    .trim();
  if line.is_empty() {
    return Ok(None);
  }

  if let Some(target) =
    line.strip_prefix("include ")
  {
    let target = target.trim();
    if target.is_empty() {
      bail!("include path cannot be empty");
    }
    return Ok(Some(RcLine::Include(
      target
    )));
  }

  let (key, value) = line
    .split_once('=')
    .ok_or_else(|| {
      anyhow!(
        "expected `key = value`, got \
         {raw:?}"
      )
    })?;
  let key = key.trim();
  if key.is_empty() {
    bail!("missing key in {raw:?}");
  }
  Ok(Some(RcLine::Setting {
    key,
    value: value.trim()
  }))
}

fn expand_tilde(raw: &str) -> PathBuf {
  if let Some(rest) =
    raw.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  PathBuf::from(raw)
}

fn parse_switch(raw: &str) -> Option<bool> {
  match raw
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "on" | "yes" | "true" | "1" => {
      Some(true)
    }
    | "off" | "no" | "false" | "0" => {
      Some(false)
    }
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::path::Path;

  use tempfile::tempdir;

  use super::{
    Config,
    RcLine,
    parse_rc_line
  };
  use crate::view::{
    SortMode,
    StatusFilter
  };

  #[test]
  fn defaults_without_rc_file() {
    let cfg = Config::default();
    assert_eq!(
      cfg.default_sort(),
      Some(SortMode::Deadline)
    );
    assert_eq!(
      cfg.default_filter(),
      StatusFilter::All
    );
    assert!(
      cfg.recover_corrupt().expect("switch")
    );
    assert!(cfg.timezone().is_none());
  }

  #[test]
  fn parses_settings_includes_and_comments()
  {
    assert_eq!(
      parse_rc_line("  # only a comment")
        .expect("comment"),
      None
    );
    assert_eq!(
      parse_rc_line(
        "default.sort = priority # why"
      )
      .expect("setting"),
      Some(RcLine::Setting {
        key: "default.sort",
        value: "priority"
      })
    );
    assert_eq!(
      parse_rc_line("include  extra.rc")
        .expect("include"),
      Some(RcLine::Include("extra.rc"))
    );
    assert!(parse_rc_line("color on").is_err());
    assert!(parse_rc_line(" = on").is_err());
  }

  #[test]
  fn loads_rc_with_includes() {
    let temp =
      tempdir().expect("tempdir");
    fs::write(
      temp.path().join("extra.rc"),
      "timezone = Europe/Berlin\n"
    )
    .expect("write include");

    let rc = temp.path().join("main.rc");
    fs::write(
      &rc,
      "# taskflow settings\n\
       default.sort = priority\n\
       \n\
       include extra.rc\n\
       include missing.rc\n\
       color = off\n"
    )
    .expect("write rc");

    let cfg = Config::load(Some(rc.as_path()))
      .expect("load rc");
    assert_eq!(
      cfg.default_sort(),
      Some(SortMode::Priority)
    );
    assert_eq!(
      cfg.timezone(),
      Some("Europe/Berlin")
    );
    assert!(!cfg.color().expect("switch"));
    assert_eq!(cfg.loaded_files().len(), 2);
  }

  #[test]
  fn include_cycles_are_errors() {
    let temp =
      tempdir().expect("tempdir");
    let own = temp.path().join("own.rc");
    fs::write(&own, "include own.rc\n")
      .expect("write rc");
    let err = Config::load(Some(own.as_path()))
      .expect_err("self include");
    assert!(
      format!("{err:#}")
        .contains("include cycle")
    );

    let a = temp.path().join("a.rc");
    let b = temp.path().join("b.rc");
    fs::write(&a, "include b.rc\n")
      .expect("write a");
    fs::write(&b, "include a.rc\n")
      .expect("write b");
    assert!(
      Config::load(Some(a.as_path())).is_err()
    );
  }

  #[test]
  fn shared_include_is_not_a_cycle() {
    let temp =
      tempdir().expect("tempdir");
    let dir = temp.path();
    fs::write(
      dir.join("common.rc"),
      "color = off\n"
    )
    .expect("write common");
    fs::write(
      dir.join("left.rc"),
      "include common.rc\n"
    )
    .expect("write left");
    fs::write(
      dir.join("main.rc"),
      "include left.rc\ninclude common.rc\n"
    )
    .expect("write main");

    let main = dir.join("main.rc");
    let cfg = Config::load(Some(main.as_path()))
      .expect("diamond include");
    assert_eq!(cfg.loaded_files().len(), 4);
  }

  #[test]
  fn overrides_strip_rc_prefix() {
    let mut cfg = Config::default();
    cfg.apply_overrides([
      (
        "rc.default.filter".to_string(),
        "overdue".to_string()
      ),
      (
        "storage.recover".to_string(),
        "off".to_string()
      )
    ]);
    assert_eq!(
      cfg.default_filter(),
      StatusFilter::Overdue
    );
    assert!(
      !cfg.recover_corrupt().expect("switch")
    );
  }

  #[test]
  fn bad_switch_values_are_rejected() {
    let mut cfg = Config::default();
    cfg.apply_overrides([(
      "color".to_string(),
      "sometimes".to_string()
    )]);
    assert!(cfg.color().is_err());
  }

  #[test]
  fn data_dir_prefers_flag() {
    let cfg = Config::default();
    assert_eq!(
      cfg.data_dir(Some(Path::new("/tmp/tf"))),
      Path::new("/tmp/tf")
    );

    let mut cfg = Config::default();
    cfg.apply_overrides([(
      "data.location".to_string(),
      "/srv/taskflow".to_string()
    )]);
    assert_eq!(
      cfg.data_dir(None),
      Path::new("/srv/taskflow")
    );
  }
}
