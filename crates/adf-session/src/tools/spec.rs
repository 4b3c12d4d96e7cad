//! Structured tool descriptions.
//!
//! A [`ToolSpec`] renders purpose, usage guidance, examples and the output
//! format into the single description string a function-calling model sees.
//! `when_not_to_use` matters most here: `read_artifact`, `describe_artifact`
//! and `exec_script` all look at the same data, and the model has to pick the
//! cheapest one.

use crate::ToolDef;

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    /// One imperative sentence: "Run analysis code inside the session".
    pub purpose: String,
    pub when_to_use: String,
    pub when_not_to_use: String,
    /// JSON Schema of the arguments object.
    pub parameters: serde_json::Value,
    pub examples: Vec<UsageExample>,
    pub output_format: String,
    pub disambiguation: Vec<DisambiguationExample>,
}

/// A situation where this tool is confused with another one.
#[derive(Debug, Clone)]
pub struct DisambiguationExample {
    pub scenario: String,
    pub correct_tool: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct UsageExample {
    pub input: String,
    pub output: String,
}

impl ToolSpec {
    pub fn builder(name: impl Into<String>) -> ToolSpecBuilder {
        ToolSpecBuilder {
            name: name.into(),
            purpose: String::new(),
            when_to_use: String::new(),
            when_not_to_use: String::new(),
            parameters: None,
            examples: Vec::new(),
            output_format: None,
            disambiguation: Vec::new(),
        }
    }

    /// Description string sent to the model. Empty sections are omitted.
    pub fn to_description(&self) -> String {
        let mut desc = format!("{}.", self.purpose.trim_end_matches('.'));
        if !self.when_to_use.is_empty() {
            desc.push_str(&format!("\nWhen to use: {}", self.when_to_use));
        }
        if !self.when_not_to_use.is_empty() {
            desc.push_str(&format!("\nWhen NOT to use: {}", self.when_not_to_use));
        }

        if !self.examples.is_empty() {
            desc.push_str("\nExamples:");
            for ex in &self.examples {
                desc.push_str(&format!("\n  - Input: {} → {}", ex.input, ex.output));
            }
        }

        if !self.output_format.is_empty() {
            desc.push_str(&format!("\nOutput format: {}", self.output_format));
        }

        if !self.disambiguation.is_empty() {
            desc.push_str("\nDisambiguation:");
            for d in &self.disambiguation {
                desc.push_str(&format!(
                    "\n  - {}: use '{}' instead, {}",
                    d.scenario, d.correct_tool, d.reason
                ));
            }
        }

        desc
    }

    pub fn to_tool_def(&self) -> ToolDef {
        ToolDef::new(
            self.name.clone(),
            self.to_description(),
            self.parameters.clone(),
        )
    }
}

pub struct ToolSpecBuilder {
    name: String,
    purpose: String,
    when_to_use: String,
    when_not_to_use: String,
    parameters: Option<serde_json::Value>,
    examples: Vec<UsageExample>,
    output_format: Option<String>,
    disambiguation: Vec<DisambiguationExample>,
}

impl ToolSpecBuilder {
    pub fn purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = purpose.into();
        self
    }

    pub fn when_to_use(mut self, when: impl Into<String>) -> Self {
        self.when_to_use = when.into();
        self
    }

    pub fn when_not_to_use(mut self, when_not: impl Into<String>) -> Self {
        self.when_not_to_use = when_not.into();
        self
    }

    pub fn parameters(mut self, params: serde_json::Value) -> Self {
        self.parameters = Some(params);
        self
    }

    /// Derive the parameter schema from the argument type, so schema and
    /// deserialization cannot drift apart.
    pub fn parameters_for<T: schemars::JsonSchema>(self) -> Self {
        self.parameters(crate::json_schema_for::<T>())
    }

    pub fn example(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.examples.push(UsageExample {
            input: input.into(),
            output: output.into(),
        });
        self
    }

    pub fn output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = Some(format.into());
        self
    }

    pub fn disambiguate(
        mut self,
        scenario: impl Into<String>,
        correct_tool: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        self.disambiguation.push(DisambiguationExample {
            scenario: scenario.into(),
            correct_tool: correct_tool.into(),
            reason: reason.into(),
        });
        self
    }

    /// `.build().to_tool_def()`.
    pub fn to_tool_def(self) -> ToolDef {
        self.build().to_tool_def()
    }

    /// Missing parameters default to an empty object schema.
    pub fn build(self) -> ToolSpec {
        ToolSpec {
            name: self.name,
            purpose: self.purpose,
            when_to_use: self.when_to_use,
            when_not_to_use: self.when_not_to_use,
            parameters: self
                .parameters
                .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
            examples: self.examples,
            output_format: self.output_format.unwrap_or_else(|| "Plain text".into()),
            disambiguation: self.disambiguation,
        }
    }
}
