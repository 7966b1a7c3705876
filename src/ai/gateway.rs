// gateway.rs — Typed adapter over an `OracleTransport`.
//
// Each operation is one round trip. The gateway builds the wire request,
// validates the JSON the transport returns, and hands back a typed value.
// Structurally invalid responses are errors; nothing is coerced.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::{
    AiError, ComponentInfo, OracleOperation, OracleRequest, OracleTransport, RepairPlan,
    VerificationResult,
};
use crate::geometry::NormalizedPoint;

pub struct OracleGateway {
    transport: Arc<dyn OracleTransport>,
}

impl OracleGateway {
    pub fn new(transport: Arc<dyn OracleTransport>) -> Self {
        Self { transport }
    }

    pub fn provider_name(&self) -> &str {
        self.transport.name()
    }

    /// Diagnose the object in `image` (base64 JPEG) and produce a repair plan.
    ///
    /// Any failure, transport or shape, is reported as
    /// [`AiError::DiagnosisFailed`].
    pub async fn plan_from_image(&self, image: &str) -> Result<RepairPlan, AiError> {
        let mut req = OracleRequest::new(OracleOperation::PlanFromImage);
        req.image = Some(image.to_string());

        let raw = self
            .transport
            .send(&req)
            .await
            .map_err(|e| AiError::DiagnosisFailed(e.to_string()))?;
        let plan = parse_plan(raw)?;
        log::info!(
            "Oracle ({}): plan for '{}' with {} steps",
            self.transport.name(),
            plan.object_name,
            plan.steps.len()
        );
        Ok(plan)
    }

    /// Ask whether `instruction` has been carried out in `image`.
    pub async fn verify_step(
        &self,
        image: &str,
        instruction: &str,
    ) -> Result<VerificationResult, AiError> {
        let mut req = OracleRequest::new(OracleOperation::VerifyStep);
        req.image = Some(image.to_string());
        req.text = Some(instruction.to_string());

        let raw = self.transport.send(&req).await?;
        let result: VerificationResult = decode(OracleOperation::VerifyStep, raw)?;
        log::debug!(
            "Oracle: verify completed={} feedback={:?}",
            result.completed,
            result.feedback
        );
        Ok(result)
    }

    /// Identify the component at `point` (percent coordinates) in `image`.
    pub async fn identify_component(
        &self,
        image: &str,
        point: NormalizedPoint,
        object_context: &str,
    ) -> Result<ComponentInfo, AiError> {
        let mut req = OracleRequest::new(OracleOperation::IdentifyComponent);
        req.image = Some(image.to_string());
        req.point = Some(point);
        req.object_context = Some(object_context.to_string());

        let raw = self.transport.send(&req).await?;
        let info: ComponentInfo = decode(OracleOperation::IdentifyComponent, raw)?;
        if info.name.trim().is_empty() {
            return Err(AiError::InvalidResponse(
                "identify_component: empty component name".into(),
            ));
        }
        Ok(info)
    }

    /// Answer a spoken question (`audio`, base64 WAV) about the current step.
    pub async fn answer_question(
        &self,
        image: &str,
        audio: &str,
        instruction: &str,
    ) -> Result<String, AiError> {
        let mut req = OracleRequest::new(OracleOperation::AnswerQuestion);
        req.image = Some(image.to_string());
        req.audio = Some(audio.to_string());
        req.text = Some(instruction.to_string());

        let raw = self.transport.send(&req).await?;
        let answer: Answer = decode(OracleOperation::AnswerQuestion, raw)?;
        if answer.answer.trim().is_empty() {
            return Err(AiError::InvalidResponse("answer_question: empty answer".into()));
        }
        Ok(answer.answer)
    }
}

#[derive(Deserialize)]
struct Answer {
    answer: String,
}

fn decode<T: for<'de> Deserialize<'de>>(op: OracleOperation, raw: Value) -> Result<T, AiError> {
    serde_json::from_value(raw)
        .map_err(|e| AiError::InvalidResponse(format!("{}: {}", op.as_str(), e)))
}

/// Decode and validate a plan. Coordinates are kept exactly as received.
pub fn parse_plan(raw: Value) -> Result<RepairPlan, AiError> {
    let plan: RepairPlan = serde_json::from_value(raw)
        .map_err(|e| AiError::DiagnosisFailed(format!("malformed plan: {}", e)))?;

    if plan.steps.is_empty() {
        return Err(AiError::DiagnosisFailed("plan has no steps".into()));
    }
    for (i, step) in plan.steps.iter().enumerate() {
        if step.instruction.trim().is_empty() {
            return Err(AiError::DiagnosisFailed(format!(
                "step {} has no instruction",
                i
            )));
        }
        if !step.visual_cue.coordinates.is_well_formed() {
            return Err(AiError::DiagnosisFailed(format!(
                "step {} has malformed cue coordinates {:?}",
                i, step.visual_cue.coordinates
            )));
        }
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::CueType;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replies with a canned value and records the last request.
    struct Canned {
        reply: Mutex<Option<Result<Value, AiError>>>,
        last: Mutex<Option<OracleRequest>>,
    }

    impl Canned {
        fn ok(v: Value) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(Some(Ok(v))),
                last: Mutex::new(None),
            })
        }

        fn err(e: AiError) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(Some(Err(e))),
                last: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl OracleTransport for Canned {
        async fn send(&self, request: &OracleRequest) -> Result<Value, AiError> {
            *self.last.lock().unwrap() = Some(request.clone());
            self.reply.lock().unwrap().take().expect("one reply only")
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn plan_json() -> Value {
        json!({
            "object_name": "Bicycle",
            "issue_diagnosis": "Chain has come off the rear sprocket",
            "steps": [
                {
                    "id": 1,
                    "title": "Shift down",
                    "instruction": "Shift to the smallest rear sprocket.",
                    "visual_cue": {
                        "type": "box",
                        "coordinates": { "xmin": 0.125, "ymin": 0.3, "xmax": 0.45, "ymax": 0.7 },
                        "label": "Derailleur"
                    }
                },
                {
                    "id": 2,
                    "title": "Seat the chain",
                    "instruction": "Loop the chain over the top teeth and turn the pedal backwards.",
                    "visual_cue": {
                        "type": "arrow",
                        "coordinates": { "xmin": 0.6, "ymin": 0.1, "xmax": 0.9, "ymax": 0.333 },
                        "direction": "clockwise"
                    },
                    "tool_needed": "Gloves",
                    "safety_warning": "Keep fingers clear of the teeth"
                }
            ]
        })
    }

    #[tokio::test]
    async fn plan_decode_preserves_order_and_coordinates() {
        let gw = OracleGateway::new(Canned::ok(plan_json()));
        let plan = gw.plan_from_image("img").await.unwrap();

        assert_eq!(plan.object_name, "Bicycle");
        assert_eq!(plan.steps.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2]);
        let c0 = plan.steps[0].visual_cue.coordinates;
        assert_eq!((c0.xmin, c0.ymin, c0.xmax, c0.ymax), (0.125, 0.3, 0.45, 0.7));
        let c1 = plan.steps[1].visual_cue.coordinates;
        assert_eq!((c1.xmin, c1.ymin, c1.xmax, c1.ymax), (0.6, 0.1, 0.9, 0.333));
        assert_eq!(plan.steps[1].visual_cue.kind, CueType::Arrow);
        assert_eq!(plan.steps[1].tool_needed.as_deref(), Some("Gloves"));

        // Serialize and decode again: nothing drifts.
        let again = parse_plan(serde_json::to_value(&plan).unwrap()).unwrap();
        assert_eq!(again, plan);
    }

    #[tokio::test]
    async fn plan_request_carries_only_the_image() {
        let transport = Canned::ok(plan_json());
        let gw = OracleGateway::new(transport.clone());
        gw.plan_from_image("abc").await.unwrap();

        let req = transport.last.lock().unwrap().clone().unwrap();
        assert_eq!(req.operation, OracleOperation::PlanFromImage);
        assert_eq!(req.image.as_deref(), Some("abc"));
        assert!(req.text.is_none() && req.point.is_none() && req.audio.is_none());
    }

    #[tokio::test]
    async fn plan_without_steps_is_diagnosis_failure() {
        let mut v = plan_json();
        v["steps"] = json!([]);
        let gw = OracleGateway::new(Canned::ok(v));
        assert!(matches!(
            gw.plan_from_image("img").await,
            Err(AiError::DiagnosisFailed(_))
        ));
    }

    #[tokio::test]
    async fn plan_with_percent_coordinates_is_rejected() {
        let mut v = plan_json();
        v["steps"][0]["visual_cue"]["coordinates"]["xmax"] = json!(45.0);
        let gw = OracleGateway::new(Canned::ok(v));
        assert!(matches!(
            gw.plan_from_image("img").await,
            Err(AiError::DiagnosisFailed(_))
        ));
    }

    #[tokio::test]
    async fn plan_transport_error_becomes_diagnosis_failure() {
        let gw = OracleGateway::new(Canned::err(AiError::ConnectionError("offline".into())));
        match gw.plan_from_image("img").await {
            Err(AiError::DiagnosisFailed(msg)) => assert!(msg.contains("offline")),
            other => panic!("expected DiagnosisFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn verify_sends_instruction_text() {
        let transport = Canned::ok(json!({ "completed": false, "feedback": "loose screw" }));
        let gw = OracleGateway::new(transport.clone());
        let result = gw.verify_step("img", "Tighten the screw").await.unwrap();
        assert!(!result.completed);
        assert_eq!(result.feedback, "loose screw");

        let req = transport.last.lock().unwrap().clone().unwrap();
        assert_eq!(req.text.as_deref(), Some("Tighten the screw"));
    }

    #[tokio::test]
    async fn verify_missing_feedback_is_invalid() {
        let gw = OracleGateway::new(Canned::ok(json!({ "completed": true })));
        assert!(matches!(
            gw.verify_step("img", "x").await,
            Err(AiError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn identify_passes_point_and_context() {
        let transport = Canned::ok(json!({
            "name": "Brake caliper",
            "function": "Clamps the rotor",
            "status": "Damaged",
            "details": "Pad worn to the backing plate"
        }));
        let gw = OracleGateway::new(transport.clone());
        let info = gw
            .identify_component("img", NormalizedPoint { x: 40.0, y: 60.0 }, "Bicycle")
            .await
            .unwrap();
        assert_eq!(info.status, crate::ai::ComponentStatus::Damaged);

        let req = transport.last.lock().unwrap().clone().unwrap();
        assert_eq!(req.point, Some(NormalizedPoint { x: 40.0, y: 60.0 }));
        assert_eq!(req.object_context.as_deref(), Some("Bicycle"));
    }

    #[tokio::test]
    async fn identify_unknown_status_string_is_invalid() {
        let gw = OracleGateway::new(Canned::ok(json!({
            "name": "Valve", "function": "f", "status": "Broken", "details": "d"
        })));
        assert!(matches!(
            gw.identify_component("img", NormalizedPoint { x: 1.0, y: 1.0 }, "x").await,
            Err(AiError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn answer_requires_answer_field() {
        let gw = OracleGateway::new(Canned::ok(json!({ "answer": "Use a 5mm hex key." })));
        assert_eq!(
            gw.answer_question("img", "wav", "Loosen the bolt").await.unwrap(),
            "Use a 5mm hex key."
        );

        let gw = OracleGateway::new(Canned::ok(json!("Use a 5mm hex key.")));
        assert!(gw.answer_question("img", "wav", "x").await.is_err());
    }
}
