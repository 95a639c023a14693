use anyhow::Result;
use serde::Serialize;

/// Output formatter that supports both human-readable and JSON output
pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Output a successful result
    pub fn success<T: Serialize>(&self, command: &str, data: T) -> Result<()> {
        if self.json {
            let response = JsonResponse {
                status: "ok",
                command,
                data: Some(data),
                error: None::<String>,
            };
            println!("{}", serde_json::to_string(&response)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Ok(())
    }

    /// Output an error
    pub fn error(&self, message: &str) {
        if self.json {
            let response: JsonResponse<()> = JsonResponse {
                status: "error",
                command: "",
                data: None,
                error: Some(message.to_string()),
            };
            match serde_json::to_string(&response) {
                Ok(line) => eprintln!("{}", line),
                Err(_) => eprintln!("Error: {}", message),
            }
        } else {
            eprintln!("Error: {}", message);
        }
    }

    /// Output one event of a stream (emitted batches, failures)
    pub fn event<T: Serialize>(&self, event_type: &str, data: T) -> Result<()> {
        if self.json {
            let event = StreamEvent {
                event: event_type,
                data,
            };
            println!("{}", serde_json::to_string(&event)?);
        } else {
            println!("[{}] {}", event_type, serde_json::to_string_pretty(&data)?);
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonResponse<'a, T: Serialize> {
    status: &'a str,
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct StreamEvent<'a, T: Serialize> {
    event: &'a str,
    #[serde(flatten)]
    data: T,
}
