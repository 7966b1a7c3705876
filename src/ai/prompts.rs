// prompts.rs — Per-operation instructions and response schemas.
//
// Schemas are written for strict structured output: every property is
// required and optional values are expressed as nullable types.

use serde_json::{json, Value};

use super::{OracleOperation, OracleRequest};

pub const SYSTEM_PROMPT: &str = "You are an expert repair technician guiding a user through a hands-on \
repair via their phone camera. Be concrete, brief and safety-conscious. Always answer with JSON that \
matches the requested schema.";

/// User-turn text for a request.
pub fn user_text(request: &OracleRequest) -> String {
    let text = request.text.as_deref().unwrap_or("");
    match request.operation {
        OracleOperation::PlanFromImage => "Identify the object in this image, diagnose the most likely \
visible problem, and produce an ordered step-by-step repair plan. For each step give a visual cue whose \
coordinates are fractions of the image (0 to 1, origin top-left) locating the part to act on."
            .to_string(),
        OracleOperation::VerifyStep => format!(
            "The user is working on this step: \"{}\". Look at the image and decide whether the step \
has been completed. If not, explain briefly what is still wrong.",
            text
        ),
        OracleOperation::IdentifyComponent => {
            let (x, y) = request.point.map(|p| (p.x, p.y)).unwrap_or((50.0, 50.0));
            format!(
                "The object is: {}. The user tapped at x={:.1}%, y={:.1}% of the image (percent of \
width and height, origin top-left). Identify the component at that point, what it does, and whether it \
looks good or damaged.",
                request.object_context.as_deref().unwrap_or("unknown"),
                x,
                y
            )
        }
        OracleOperation::AnswerQuestion => format!(
            "The user is on this repair step: \"{}\". The audio contains their spoken question; use \
the image as visual context. Answer in one or two sentences suitable for reading aloud.",
            text
        ),
    }
}

fn nullable_string() -> Value {
    json!({ "type": ["string", "null"] })
}

fn plan_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["object_name", "issue_diagnosis", "steps"],
        "properties": {
            "object_name": { "type": "string" },
            "issue_diagnosis": { "type": "string" },
            "steps": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["id", "title", "instruction", "visual_cue", "tool_needed", "safety_warning"],
                    "properties": {
                        "id": { "type": "integer" },
                        "title": { "type": "string" },
                        "instruction": { "type": "string" },
                        "tool_needed": nullable_string(),
                        "safety_warning": nullable_string(),
                        "visual_cue": {
                            "type": "object",
                            "additionalProperties": false,
                            "required": ["type", "coordinates", "label", "direction"],
                            "properties": {
                                "type": { "type": "string", "enum": ["box", "arrow", "point", "none"] },
                                "label": nullable_string(),
                                "direction": nullable_string(),
                                "coordinates": {
                                    "type": "object",
                                    "additionalProperties": false,
                                    "required": ["xmin", "ymin", "xmax", "ymax"],
                                    "properties": {
                                        "xmin": { "type": "number" },
                                        "ymin": { "type": "number" },
                                        "xmax": { "type": "number" },
                                        "ymax": { "type": "number" }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    })
}

fn verification_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["completed", "feedback"],
        "properties": {
            "completed": { "type": "boolean" },
            "feedback": { "type": "string" }
        }
    })
}

fn component_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["name", "function", "status", "details"],
        "properties": {
            "name": { "type": "string" },
            "function": { "type": "string" },
            "status": { "type": "string", "enum": ["Good", "Damaged", "Unknown"] },
            "details": { "type": "string" }
        }
    })
}

fn answer_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["answer"],
        "properties": {
            "answer": { "type": "string" }
        }
    })
}

/// JSON schema the response for `op` must satisfy.
pub fn response_schema(op: OracleOperation) -> Value {
    match op {
        OracleOperation::PlanFromImage => plan_schema(),
        OracleOperation::VerifyStep => verification_schema(),
        OracleOperation::IdentifyComponent => component_schema(),
        OracleOperation::AnswerQuestion => answer_schema(),
    }
}
