use crate::db;
use crate::directory::StudentSort;
use crate::grading::{Cgpa, GradingOptions, MissingMarkPolicy};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::results::{ConcurrencyPolicy, DerivedFieldPolicy, SubmitPolicy};
use log::{info, warn};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Grading,
    Directory,
}

impl SetupSection {
    const ALL: [SetupSection; 2] = [SetupSection::Grading, SetupSection::Directory];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "grading" => Some(Self::Grading),
            "directory" => Some(Self::Directory),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Grading => "grading",
            Self::Directory => "directory",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Grading => "setup.grading",
            Self::Directory => "setup.directory",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Grading => json!({
            "missingMarkPolicy": MissingMarkPolicy::default().as_str(),
            "weightByCredit": false,
            "passingCgpa": GradingOptions::default().passing_cgpa.as_f64(),
            "derivedFieldPolicy": DerivedFieldPolicy::default().as_str(),
            "concurrency": ConcurrencyPolicy::default().as_str()
        }),
        SetupSection::Directory => json!({
            "defaultSortBy": StudentSort::default().as_str()
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_str<'a>(v: &'a Value, key: &str) -> Result<&'a str, String> {
    v.as_str().ok_or_else(|| format!("{} must be string", key))
}

fn parse_cgpa(v: &Value, key: &str) -> Result<Cgpa, String> {
    v.as_f64()
        .and_then(Cgpa::from_f64)
        .ok_or_else(|| format!("{} must be a number in 0..=4", key))
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Grading => match k.as_str() {
                "missingMarkPolicy" => {
                    let p = MissingMarkPolicy::parse(parse_str(v, k)?)
                        .ok_or("missingMarkPolicy must be one of: ungraded, fail")?;
                    obj.insert(k.clone(), Value::String(p.as_str().into()));
                }
                "weightByCredit" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                "passingCgpa" => {
                    obj.insert(k.clone(), json!(parse_cgpa(v, k)?.as_f64()));
                }
                "derivedFieldPolicy" => {
                    let p = DerivedFieldPolicy::parse(parse_str(v, k)?)
                        .ok_or("derivedFieldPolicy must be one of: overwrite, reject")?;
                    obj.insert(k.clone(), Value::String(p.as_str().into()));
                }
                "concurrency" => {
                    let p = ConcurrencyPolicy::parse(parse_str(v, k)?).ok_or(
                        "concurrency must be one of: last_write_wins, require_revision",
                    )?;
                    obj.insert(k.clone(), Value::String(p.as_str().into()));
                }
                _ => return Err(format!("unknown grading field: {}", k)),
            },
            SetupSection::Directory => match k.as_str() {
                "defaultSortBy" => {
                    let s = StudentSort::parse(parse_str(v, k)?)
                        .ok_or("defaultSortBy must be one of: name, roll, department")?;
                    obj.insert(k.clone(), Value::String(s.as_str().into()));
                }
                _ => return Err(format!("unknown directory field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Stored values are re-validated; a bad one leaves the rest of the section intact.
            for (k, v) in saved_obj {
                let mut single = Map::new();
                single.insert(k.clone(), v.clone());
                if let Err(msg) = merge_section_patch(section, &mut current, &single) {
                    warn!("ignoring stored {} setting: {}", section.name(), msg);
                }
            }
        }
    }
    Ok(current)
}

/// Grading options and submission policy in effect for the workspace.
pub fn load_grading_settings(
    conn: &rusqlite::Connection,
) -> anyhow::Result<(GradingOptions, SubmitPolicy)> {
    let section = load_section(conn, SetupSection::Grading)?;
    let get_str = |k: &str| section.get(k).and_then(|v| v.as_str()).unwrap_or("");
    let opts = GradingOptions {
        missing_mark_policy: MissingMarkPolicy::parse(get_str("missingMarkPolicy"))
            .unwrap_or_default(),
        weight_by_credit: section
            .get("weightByCredit")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        passing_cgpa: section
            .get("passingCgpa")
            .and_then(|v| v.as_f64())
            .and_then(Cgpa::from_f64)
            .unwrap_or(GradingOptions::default().passing_cgpa),
    };
    let policy = SubmitPolicy {
        derived: DerivedFieldPolicy::parse(get_str("derivedFieldPolicy")).unwrap_or_default(),
        concurrency: ConcurrencyPolicy::parse(get_str("concurrency")).unwrap_or_default(),
    };
    Ok((opts, policy))
}

pub fn load_default_sort(conn: &rusqlite::Connection) -> anyhow::Result<StudentSort> {
    let section = load_section(conn, SetupSection::Directory)?;
    Ok(section
        .get("defaultSortBy")
        .and_then(|v| v.as_str())
        .and_then(StudentSort::parse)
        .unwrap_or_default())
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut out = Map::new();
    for section in SetupSection::ALL {
        match load_section(conn, section) {
            Ok(v) => {
                out.insert(section.name().to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    info!("setup section {} updated", section.name());
    ok(
        &req.id,
        json!({ "ok": true, "section": section.name(), "values": current }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
