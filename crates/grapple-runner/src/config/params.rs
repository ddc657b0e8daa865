use crate::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Values supplied for `${name}` placeholders, usually from `-P key=value`.
#[derive(Debug, Clone, Default)]
pub struct Params {
    values: HashMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse `key=value` arguments. Later duplicates win.
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut params = Self::new();
        for arg in args {
            let (key, value) = arg.split_once('=').ok_or_else(|| {
                Error::Config(format!("invalid param '{}', expected key=value", arg))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::Config(format!("invalid param '{}', empty key", arg)));
            }
            params.values.insert(key.to_string(), value.to_string());
        }
        Ok(params)
    }

    /// Supplied keys the scenario never declares.
    pub fn undeclared<'a>(&'a self, defs: &HashMap<String, ParamDef>) -> Vec<&'a str> {
        let mut keys: Vec<&str> = self
            .values
            .keys()
            .filter(|k| !defs.contains_key(*k))
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        keys
    }
}

/// Declared parameter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParamDef {
    #[serde(default)]
    pub required: bool,
    pub default: Option<String>,
    pub description: Option<String>,
}

fn placeholder() -> Option<&'static Regex> {
    static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.-]*)\}").ok())
        .as_ref()
}

/// Replace `${name}` placeholders. Names that are neither supplied nor
/// declared are left untouched so script bodies keep their own `${...}`.
pub fn substitute(
    template: &str,
    params: &Params,
    defs: &HashMap<String, ParamDef>,
) -> Result<String> {
    let Some(re) = placeholder() else {
        return Ok(template.to_string());
    };

    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in re.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        match lookup(name.as_str(), params, defs)? {
            Some(value) => out.push_str(&value),
            None => out.push_str(whole.as_str()),
        }
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

fn lookup(name: &str, params: &Params, defs: &HashMap<String, ParamDef>) -> Result<Option<String>> {
    if let Some(v) = params.get(name) {
        return Ok(Some(v.to_string()));
    }
    match defs.get(name) {
        Some(ParamDef {
            default: Some(d), ..
        }) => Ok(Some(d.clone())),
        Some(def) if def.required => Err(Error::Config(format!(
            "missing required parameter: {}",
            name
        ))),
        Some(_) => Ok(Some(String::new())),
        None => Ok(None),
    }
}

/// Substitute in every string of a YAML tree.
pub fn substitute_value(
    value: &mut serde_yaml::Value,
    params: &Params,
    defs: &HashMap<String, ParamDef>,
) -> Result<()> {
    match value {
        serde_yaml::Value::String(s) => {
            *s = substitute(s, params, defs)?;
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                substitute_value(v, params, defs)?;
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for v in seq.iter_mut() {
                substitute_value(v, params, defs)?;
            }
        }
        serde_yaml::Value::Tagged(tagged) => {
            substitute_value(&mut tagged.value, params, defs)?;
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defs(entries: &[(&str, ParamDef)]) -> HashMap<String, ParamDef> {
        entries
            .iter()
            .map(|(k, d)| (k.to_string(), d.clone()))
            .collect()
    }

    #[test]
    fn test_substitute_supplied_and_default() {
        let params = Params::new().set("who", "SeniorCitizen");
        let d = defs(&[(
            "country",
            ParamDef {
                default: Some("India".into()),
                ..Default::default()
            },
        )]);
        let out = substitute("label-for:${who} in ${country}", &params, &d).unwrap();
        assert_eq!(out, "label-for:SeniorCitizen in India");
    }

    #[test]
    fn test_supplied_value_beats_default() {
        let params = Params::new().set("country", "Chile");
        let d = defs(&[(
            "country",
            ParamDef {
                default: Some("India".into()),
                ..Default::default()
            },
        )]);
        assert_eq!(substitute("${country}", &params, &d).unwrap(), "Chile");
    }

    #[test]
    fn test_required_missing_is_config_error() {
        let d = defs(&[(
            "user",
            ParamDef {
                required: true,
                ..Default::default()
            },
        )]);
        let err = substitute("hi ${user}", &Params::new(), &d).unwrap_err();
        assert!(matches!(err, Error::Config(m) if m.contains("user")));
    }

    #[test]
    fn test_optional_without_default_is_empty() {
        let d = defs(&[("suffix", ParamDef::default())]);
        assert_eq!(substitute("a${suffix}b", &Params::new(), &d).unwrap(), "ab");
    }

    #[test]
    fn test_undeclared_placeholders_are_kept() {
        let js = "arguments[0].value = `${prefix}-x`";
        assert_eq!(substitute(js, &Params::new(), &HashMap::new()).unwrap(), js);
    }

    #[test]
    fn test_substitute_value_walks_nested_yaml() {
        let mut value: serde_yaml::Value =
            serde_yaml::from_str("steps: [{ log: { message: 'hello ${name}' } }]").unwrap();
        substitute_value(&mut value, &Params::new().set("name", "world"), &HashMap::new()).unwrap();
        let msg = &value["steps"][0]["log"]["message"];
        assert_eq!(msg.as_str(), Some("hello world"));
    }

    #[test]
    fn test_params_from_args() {
        let args = vec!["user=alice".to_string(), "expr=a=b".to_string()];
        let params = Params::from_args(&args).unwrap();
        assert_eq!(params.get("user"), Some("alice"));
        assert_eq!(params.get("expr"), Some("a=b"));
        assert!(Params::from_args(&["novalue".to_string()]).is_err());
        assert!(Params::from_args(&["=x".to_string()]).is_err());
    }

    #[test]
    fn test_undeclared_params_are_listed() {
        let params = Params::new().set("who", "x").set("typo", "y");
        let d = defs(&[("who", ParamDef::default())]);
        assert_eq!(params.undeclared(&d), vec!["typo"]);
    }
}
