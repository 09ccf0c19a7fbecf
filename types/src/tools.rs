use serde_json::{json, Value};

/// A tool entry of the session setup. The Live API groups function
/// declarations under a single `functionDeclarations` list.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    function_declarations: Vec<FunctionDeclaration>,
}

impl Tool {
    pub fn functions(function_declarations: Vec<FunctionDeclaration>) -> Self {
        Self {
            function_declarations,
        }
    }

    pub fn function_declarations(&self) -> &[FunctionDeclaration] {
        &self.function_declarations
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionDeclaration {
    /// The name of the function
    name: String,

    /// The description of the function
    description: String,

    /// The parameters of the function in the OpenAPI subset the Live API accepts
    parameters: Value,
}

impl FunctionDeclaration {
    pub fn new(name: String, description: String, parameters: Value) -> Self {
        Self {
            name,
            description,
            parameters,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &Value {
        &self.parameters
    }
}

/// `toolCall` server payload.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    function_calls: Vec<FunctionCall>,
}

impl ToolCall {
    pub fn function_calls(&self) -> &[FunctionCall] {
        &self.function_calls
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

impl FunctionCall {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &Value {
        &self.args
    }

    /// String argument by name, if present.
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }
}

/// `toolResponse` client payload.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    function_responses: Vec<FunctionResponse>,
}

impl ToolResponse {
    pub fn new(function_responses: Vec<FunctionResponse>) -> Self {
        Self { function_responses }
    }

    pub fn function_responses(&self) -> &[FunctionResponse] {
        &self.function_responses
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    response: Value,
}

impl FunctionResponse {
    pub fn new(id: Option<String>, name: String, response: Value) -> Self {
        Self { id, name, response }
    }

    /// Acknowledges `call` with `{ "result": <result> }`.
    pub fn result(call: &FunctionCall, result: &str) -> Self {
        Self::new(
            call.id.clone(),
            call.name.clone(),
            json!({ "result": result }),
        )
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn response(&self) -> &Value {
        &self.response
    }
}
