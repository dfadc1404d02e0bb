use crate::script::Value;
use serde::{Deserialize, Serialize};

/// What an expansion produced. Scripts returning arrays keep their parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultText {
    Text(String),
    Lines(Vec<String>),
}

impl ResultText {
    /// The text that replaces the trigger.
    pub fn to_text(&self) -> String {
        match self {
            ResultText::Text(text) => text.clone(),
            ResultText::Lines(lines) => lines.concat(),
        }
    }

    /// `undefined` becomes empty text, arrays are kept element-wise and
    /// everything else goes through JavaScript string conversion.
    pub fn from_script_value(value: &Value) -> Self {
        match value {
            Value::Undefined => ResultText::Text(String::new()),
            Value::Array(items) => ResultText::Lines(
                items
                    .borrow()
                    .iter()
                    .map(|item| {
                        if item.is_nullish() {
                            String::new()
                        } else {
                            item.to_js_string()
                        }
                    })
                    .collect(),
            ),
            other => ResultText::Text(other.to_js_string()),
        }
    }
}

/// State of one expansion attempt. Scripts see it as `expansionInfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpansionContext {
    pub is_user_triggered: bool,
    /// The document line the trigger was found in.
    pub line: String,
    /// Char offsets of the trigger, including prefix and suffix, in `line`.
    pub input_start: usize,
    pub input_end: usize,
    pub trigger_text: String,
    pub prefix: String,
    pub suffix: String,
    /// Set by a script or listener to discard the result.
    pub cancel: bool,
    pub result_text: Option<ResultText>,
}

impl ExpansionContext {
    /// A context where the whole input is the trigger and no user typed it.
    pub fn for_text(trigger: &str) -> Self {
        ExpansionContext {
            line: trigger.to_string(),
            input_end: trigger.chars().count(),
            trigger_text: trigger.to_string(),
            ..Default::default()
        }
    }

    pub fn to_script_value(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(json) => Value::from_json(&json),
            Err(_) => Value::object(Vec::new()),
        }
    }

    /// Copy back the fields a script may have changed on `expansionInfo`.
    pub fn absorb_script_value(&mut self, value: &Value) {
        let Value::Object(object) = value else {
            return;
        };
        let object = object.borrow();
        let text = |key: &str| object.get(key).map(Value::to_js_string);
        let offset = |key: &str| {
            object
                .get(key)
                .map(Value::to_number)
                .filter(|n| n.is_finite() && *n >= 0.0)
                .map(|n| n as usize)
        };

        if let Some(cancel) = object.get("cancel") {
            self.cancel = cancel.truthy();
        }
        if let Some(line) = text("line") {
            self.line = line;
        }
        if let Some(start) = offset("inputStart") {
            self.input_start = start;
        }
        if let Some(end) = offset("inputEnd") {
            self.input_end = end;
        }
        if let Some(trigger) = text("triggerText") {
            self.trigger_text = trigger;
        }
        if let Some(prefix) = text("prefix") {
            self.prefix = prefix;
        }
        if let Some(suffix) = text("suffix") {
            self.suffix = suffix;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{Bindings, Sandbox, ScriptRuntime};

    #[test]
    fn fields_are_camel_case_for_scripts() {
        let context = ExpansionContext::for_text("d20");
        let json = serde_json::to_value(&context).unwrap();
        assert_eq!(json["triggerText"], "d20");
        assert_eq!(json["inputEnd"], 3);
        assert_eq!(json["isUserTriggered"], false);
    }

    #[test]
    fn script_changes_flow_back() {
        let mut context = ExpansionContext::for_text("x");
        let info = context.to_script_value();
        Sandbox::default()
            .execute(
                "expansionInfo.cancel = true;\nexpansionInfo.prefix = '[[';",
                Bindings::new().value("expansionInfo", info.clone()),
            )
            .unwrap();
        context.absorb_script_value(&info);
        assert!(context.cancel);
        assert_eq!(context.prefix, "[[");
    }

    #[test]
    fn results_normalise_script_values() {
        assert_eq!(
            ResultText::from_script_value(&Value::Undefined),
            ResultText::Text(String::new())
        );
        let lines = ResultText::from_script_value(&Value::array(vec![
            Value::from("a"),
            Value::from(1.0),
            Value::Null,
        ]));
        assert_eq!(lines, ResultText::Lines(vec!["a".into(), "1".into(), String::new()]));
        assert_eq!(lines.to_text(), "a1");
        assert_eq!(
            ResultText::from_script_value(&Value::from(2.5)).to_text(),
            "2.5"
        );
    }

    #[test]
    fn result_text_serialises_untagged() {
        let text = serde_json::to_string(&ResultText::Lines(vec!["a".into()])).unwrap();
        assert_eq!(text, r#"["a"]"#);
    }
}
