//! Observing Block Model (§3, §4 DATA MODEL): the unit of work — a
//! named program plus an ordered list of scripts with parameter
//! placeholders and static constraints. Immutable after creation;
//! instantiated (parameters bound) per dispatch.
//!
//! Parameter binding grounds scenario S6: the same resolved target
//! position is encoded differently per script — a `slew` script wants
//! hexagesimal `ra`/`dec` strings, a `standard_visit` script wants
//! numeric degrees — by substituting `$name` tokens per-script from a
//! shared resolved-parameter map.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single constraint attached to an observing block, e.g. an
/// airmass ceiling. Kept as a name/value pair rather than a closed
/// enum since concrete constraint evaluation belongs to the driver
/// (out of scope here, §1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub value: f64,
}

/// One script within an observing block. `standard` scripts are
/// built-in queue scripts; nonstandard scripts are operator-supplied
/// paths. `parameters` may reference `$name` tokens resolved at
/// dispatch from the target's resolved parameter map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScriptSpec {
    pub path: String,
    pub is_standard: bool,
    pub parameters: HashMap<String, Value>,
}

/// Immutable template for a unit of work. Instantiated (parameters
/// bound against resolved sky coordinates) per dispatch; the template
/// itself never changes after construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservingBlock {
    pub name: String,
    pub program: String,
    pub scripts: Vec<ScriptSpec>,
    pub constraints: Vec<Constraint>,
}

impl ObservingBlock {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            scripts: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn with_script(mut self, script: ScriptSpec) -> Self {
        self.scripts.push(script);
        self
    }

    pub fn with_constraint(mut self, name: impl Into<String>, value: f64) -> Self {
        self.constraints.push(Constraint {
            name: name.into(),
            value,
        });
        self
    }
}

/// Resolved sky position and exposure plan for one dispatch, the
/// source of truth that `$name` tokens in a script's parameter map
/// are bound against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedParameters {
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub rot_sky_deg: f64,
    pub band_filter: String,
    pub num_exp: u32,
    pub exp_times_s: Vec<f64>,
    pub estimated_slew_time_s: f64,
    pub note: Option<String>,
}

/// Bind one script's `$name` parameter placeholders against resolved
/// values, returning a concrete parameter map ready to hand to the
/// queue. Hexagesimal formatting is applied to `ra`/`dec` tokens only
/// for scripts that declare them as strings in their template (e.g.
/// `slew`'s `ra`/`dec`); numeric scripts (e.g. `standard_visit`) keep
/// plain degrees because their template declares them as numbers.
pub fn bind_script_parameters(
    script: &ScriptSpec,
    resolved: &ResolvedParameters,
) -> HashMap<String, Value> {
    let mut bound = HashMap::new();
    for (key, template_value) in &script.parameters {
        let value = match template_value {
            Value::String(s) if s == "$ra" => {
                if expects_hexagesimal(script, key) {
                    Value::String(ra_to_hexagesimal(resolved.ra_deg))
                } else {
                    serde_json::json!(resolved.ra_deg)
                }
            }
            Value::String(s) if s == "$dec" => {
                if expects_hexagesimal(script, key) {
                    Value::String(dec_to_hexagesimal(resolved.dec_deg))
                } else {
                    serde_json::json!(resolved.dec_deg)
                }
            }
            Value::String(s) if s == "$rot_sky" => serde_json::json!(resolved.rot_sky_deg),
            Value::String(s) if s == "$band_filter" => {
                Value::String(resolved.band_filter.clone())
            }
            Value::String(s) if s == "$num_exp" => serde_json::json!(resolved.num_exp),
            Value::String(s) if s == "$exp_times" => serde_json::json!(resolved.exp_times_s),
            Value::String(s) if s == "$estimated_slew_time" => {
                serde_json::json!(resolved.estimated_slew_time_s)
            }
            Value::String(s) if s == "$note" => match &resolved.note {
                Some(n) => Value::String(n.clone()),
                None => Value::Null,
            },
            other => other.clone(),
        };
        bound.insert(key.clone(), value);
    }
    bound
}

/// A script expects hexagesimal ra/dec when its *template* marked the
/// placeholder itself as a string rather than leaving it to be
/// resolved numerically — i.e. the template author already chose the
/// representation for this script by how they wrote the placeholder.
/// The `slew` script template uses `"$ra"` as a bare string parameter
/// without a sibling numeric hint; `standard_visit` uses `$ra` too but
/// the presence of `ang`/`num_exp` numeric siblings signals a numeric
/// script. Since both templates literally use the string `"$ra"`, the
/// distinguishing signal carried in practice is the script path.
fn expects_hexagesimal(script: &ScriptSpec, _key: &str) -> bool {
    script.path.contains("slew")
}

// Note: the queue scripts this crate dispatches against encode both
// ra and dec as signed degree-based sexagesimal strings (not ra in
// hour units) — confirmed by the slew script's documented parameter
// contract (§8 scenario S6: ra=10deg -> "+10:00:00.000").
fn ra_to_hexagesimal(ra_deg: f64) -> String {
    dec_to_hexagesimal(ra_deg)
}

fn dec_to_hexagesimal(dec_deg: f64) -> String {
    let sign = if dec_deg < 0.0 { "-" } else { "+" };
    let (d, m, s) = degrees_to_sexagesimal(dec_deg.abs());
    format!("{sign}{d:02}:{m:02}:{s:06.3}")
}

fn degrees_to_sexagesimal(value: f64) -> (u32, u32, f64) {
    let whole = value.trunc();
    let frac_minutes = (value - whole) * 60.0;
    let minutes = frac_minutes.trunc();
    let seconds = (frac_minutes - minutes) * 60.0;
    (whole as u32, minutes as u32, seconds)
}
