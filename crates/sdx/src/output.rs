use serde::Serialize;
use serde_json::Value;

/// Writes command results to stdout, as JSON envelopes with `--json` and as
/// `key: value` lines otherwise. Errors go to stderr.
pub struct Output {
    json: bool,
}

#[derive(Serialize)]
struct Envelope<'a> {
    status: &'a str,
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    pub fn success<T: Serialize>(&self, command: &str, data: T) {
        let data = to_value(data);
        if self.json {
            print_line(&Envelope {
                status: "ok",
                command,
                data: Some(data),
                error: None,
            });
        } else {
            println!("{}", render(&data));
        }
    }

    /// One-line confirmation; wrapped as `{"message": ...}` in JSON mode.
    pub fn success_message(&self, command: &str, message: &str) {
        if self.json {
            self.success(command, serde_json::json!({ "message": message }));
        } else {
            println!("{}", message);
        }
    }

    pub fn error(&self, message: &str) {
        if self.json {
            let envelope = Envelope {
                status: "error",
                command: "",
                data: None,
                error: Some(message),
            };
            match serde_json::to_string(&envelope) {
                Ok(line) => eprintln!("{}", line),
                Err(_) => eprintln!("Error: {}", message),
            }
        } else {
            eprintln!("Error: {}", message);
        }
    }

    /// A message handed to the transport during a command.
    pub fn event<T: Serialize>(&self, kind: &str, data: T) {
        let event = with_event(kind, to_value(data));
        if self.json {
            print_line(&event);
        } else {
            let fields = match &event {
                Value::Object(map) => map
                    .iter()
                    .filter(|(key, _)| key.as_str() != "event")
                    .map(|(key, value)| format!("{}={}", key, scalar(value)))
                    .collect::<Vec<_>>()
                    .join(" "),
                other => scalar(other),
            };
            println!("[{}] {}", kind, fields);
        }
    }
}

fn to_value<T: Serialize>(data: T) -> Value {
    serde_json::to_value(data).unwrap_or_else(|e| Value::String(format!("<unserializable: {}>", e)))
}

fn print_line<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{}", line),
        Err(e) => eprintln!("Error: failed to encode output: {}", e),
    }
}

/// Tags `data` with its event kind. Object fields are merged in; other
/// values go under `data`.
fn with_event(kind: &str, data: Value) -> Value {
    let mut map = serde_json::Map::new();
    map.insert("event".to_string(), Value::String(kind.to_string()));
    match data {
        Value::Object(fields) => map.extend(fields),
        other => {
            map.insert("data".to_string(), other);
        }
    }
    Value::Object(map)
}

/// Strings unquoted, everything else as compact JSON.
fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render(data: &Value) -> String {
    match data {
        Value::Object(map) if !map.is_empty() => map
            .iter()
            .map(|(key, value)| format!("{}: {}", key, scalar(value)))
            .collect::<Vec<_>>()
            .join("\n"),
        other => scalar(other),
    }
}
