use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::engine::badges::BadgeSummary;
use crate::engine::grader::answers_from_json;
use crate::engine::progress::LearnerProgress;
use crate::engine::service::{Dashboard, Submission, SubmissionResult, TopicView};
use crate::engine::unlock::{Eligibility, UnitState};
use crate::engine::ProgressEngine;
use crate::error::AppError;
use crate::models::*;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ProgressEngine>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // submissions
        .route("/api/assessments/submit", post(submit_assessment))
        // learner views
        .route("/api/students/:student_id/progress", get(student_progress))
        .route("/api/students/:student_id/dashboard", get(dashboard))
        .route(
            "/api/students/:student_id/conservations/:conservation_id/topics",
            get(conservation_topics),
        )
        .route(
            "/api/students/:student_id/conservations/:conservation_id/eligibility",
            get(final_eligibility),
        )
        .route(
            "/api/students/:student_id/topics/:topic_id/access",
            get(topic_access),
        )
        .route("/api/students/:student_id/badges", get(student_badges))
        // badge catalog
        .route("/api/badges", get(list_badges).post(create_badge))
        .with_state(state)
}

/// Ids arrive as strings so an unparsable assessment id can still take the
/// soft "unknown assessment" path.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SubmitReq {
    assessment_id: String,
    student_id: String,
    #[serde(default)]
    answers: Vec<serde_json::Value>,
}

async fn submit_assessment(
    State(state): State<AppState>,
    body: Result<Json<SubmitReq>, JsonRejection>,
) -> Result<Json<SubmissionResult>, AppError> {
    let Json(req) = body.map_err(|e| AppError::MalformedPayload(e.body_text()))?;

    let student_id = Uuid::parse_str(req.student_id.trim())
        .map(StudentId)
        .map_err(|_| AppError::NotFound(format!("learner not found: {}", req.student_id)))?;
    // nil never matches a stored assessment
    let assessment_id = AssessmentId(Uuid::parse_str(req.assessment_id.trim()).unwrap_or(Uuid::nil()));

    let result = state
        .engine
        .submit(Submission {
            assessment_id,
            student_id,
            answers: answers_from_json(&req.answers),
        })
        .await?;
    Ok(Json(result))
}

async fn student_progress(
    State(state): State<AppState>,
    path: Result<Path<StudentId>, PathRejection>,
) -> Result<Json<LearnerProgress>, AppError> {
    let Path(student_id) = path?;
    Ok(Json(state.engine.progress(student_id).await?))
}

async fn dashboard(
    State(state): State<AppState>,
    path: Result<Path<StudentId>, PathRejection>,
) -> Result<Json<Dashboard>, AppError> {
    let Path(student_id) = path?;
    Ok(Json(state.engine.dashboard(student_id).await?))
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct TopicsQuery {
    #[serde(default)]
    unlocked_only: bool,
}

async fn conservation_topics(
    State(state): State<AppState>,
    path: Result<Path<(StudentId, ConservationId)>, PathRejection>,
    query: Result<Query<TopicsQuery>, QueryRejection>,
) -> Result<Json<Vec<TopicView>>, AppError> {
    let Path((student_id, conservation_id)) = path?;
    let Query(query) = query?;
    let topics = if query.unlocked_only {
        state.engine.unlocked_topics(student_id, conservation_id).await?
    } else {
        state.engine.topics_for(student_id, conservation_id).await?
    };
    Ok(Json(topics))
}

async fn final_eligibility(
    State(state): State<AppState>,
    path: Result<Path<(StudentId, ConservationId)>, PathRejection>,
) -> Result<Json<Eligibility>, AppError> {
    let Path((student_id, conservation_id)) = path?;
    Ok(Json(state.engine.eligibility(student_id, conservation_id).await?))
}

async fn topic_access(
    State(state): State<AppState>,
    path: Result<Path<(StudentId, TopicId)>, PathRejection>,
) -> Result<Json<UnitState>, AppError> {
    let Path((student_id, topic_id)) = path?;
    Ok(Json(state.engine.topic_access(student_id, topic_id).await?))
}

async fn student_badges(
    State(state): State<AppState>,
    path: Result<Path<StudentId>, PathRejection>,
) -> Result<Json<BadgeSummary>, AppError> {
    let Path(student_id) = path?;
    Ok(Json(state.engine.badge_summary(student_id).await?))
}

async fn list_badges(State(state): State<AppState>) -> Result<Json<Vec<Badge>>, AppError> {
    Ok(Json(state.engine.catalog().await?))
}

async fn create_badge(
    State(state): State<AppState>,
    body: Result<Json<NewBadge>, JsonRejection>,
) -> Result<Json<Badge>, AppError> {
    let Json(new) = body.map_err(|e| AppError::MalformedPayload(e.body_text()))?;
    if new.name.trim().is_empty() {
        return Err(AppError::MalformedPayload("name is required".into()));
    }
    if !(0..=100).contains(&new.required_score) {
        return Err(AppError::MalformedPayload(
            "requiredScore must be a percentage between 0 and 100".into(),
        ));
    }
    Ok(Json(state.engine.create_badge(new).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::service::tests::{World, KEYS};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(world: &World) -> Router {
        router(AppState {
            engine: Arc::new(world.engine()),
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_submit_walkthrough() {
        let world = World::new();
        let app = app(&world);
        let (status, body) = send(
            &app,
            "POST",
            "/api/assessments/submit",
            Some(json!({
                "assessmentId": world.topic_assessments[0].id,
                "studentId": world.student.id,
                "answers": [0, 1, 0, 2, 1]
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["score"], 3);
        assert_eq!(body["total"], 5);
        assert_eq!(body["percentage"], 60);
        assert_eq!(body["passed"], true);
        assert_eq!(body["badgeEarned"], false);
        assert_eq!(body["badges"][0]["type"], "TOPIC_COMPLETION");
    }

    #[tokio::test]
    async fn test_submit_unknown_assessment() {
        let world = World::new();
        let app = app(&world);
        for assessment_id in [Uuid::new_v4().to_string(), "not-an-id".to_string()] {
            let (status, body) = send(
                &app,
                "POST",
                "/api/assessments/submit",
                Some(json!({
                    "assessmentId": assessment_id,
                    "studentId": world.student.id,
                    "answers": [0]
                })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!({ "ok": false, "score": 0, "total": 0 }));
        }
    }

    #[tokio::test]
    async fn test_submit_unknown_learner() {
        let world = World::new();
        let app = app(&world);
        let (status, body) = send(
            &app,
            "POST",
            "/api/assessments/submit",
            Some(json!({
                "assessmentId": world.topic_assessments[0].id,
                "studentId": Uuid::new_v4(),
                "answers": KEYS
            })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("learner not found"));
    }

    #[tokio::test]
    async fn test_submit_unparsable_learner_id() {
        let world = World::new();
        let app = app(&world);
        let (status, body) = send(
            &app,
            "POST",
            "/api/assessments/submit",
            Some(json!({
                "assessmentId": world.topic_assessments[0].id,
                "studentId": "not-a-uuid",
                "answers": KEYS
            })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("learner not found"));
    }

    #[tokio::test]
    async fn test_bad_path_ids_get_json_errors() {
        let world = World::new();
        let app = app(&world);
        let uris = [
            "/api/students/not-a-uuid/progress".to_string(),
            "/api/students/not-a-uuid/badges".to_string(),
            format!(
                "/api/students/{}/conservations/nope/topics",
                world.student.id
            ),
            format!("/api/students/{}/topics/nope/access", world.student.id),
        ];
        for uri in uris {
            let (status, body) = send(&app, "GET", &uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(body["error"].is_string(), "{uri}");
        }
    }

    #[tokio::test]
    async fn test_unlocked_only_topics() {
        let world = World::new();
        let app = app(&world);
        let uri = format!(
            "/api/students/{}/conservations/{}/topics?unlockedOnly=true",
            world.student.id, world.conservation.id
        );
        let (status, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<_> = body.as_array().unwrap().iter().map(|t| t["id"].clone()).collect();
        assert_eq!(ids, vec![json!(world.topics[0].id)]);

        send(
            &app,
            "POST",
            "/api/assessments/submit",
            Some(json!({
                "assessmentId": world.topic_assessments[0].id,
                "studentId": world.student.id,
                "answers": KEYS
            })),
        )
        .await;
        let (_, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (status, body) = send(&app, "GET", &format!("{uri}x"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_submit_tolerates_junk_answers() {
        let world = World::new();
        let app = app(&world);
        let (status, body) = send(
            &app,
            "POST",
            "/api/assessments/submit",
            Some(json!({
                "assessmentId": world.topic_assessments[0].id,
                "studentId": world.student.id,
                "answers": [0, "1", null, 99, -1]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["score"], 1);
        assert_eq!(body["passed"], false);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let world = World::new();
        let app = app(&world);
        let (status, body) = send(
            &app,
            "POST",
            "/api/assessments/submit",
            Some(json!({ "answers": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_topics_and_eligibility_routes() {
        let world = World::new();
        let app = app(&world);
        let topics_uri = format!(
            "/api/students/{}/conservations/{}/topics",
            world.student.id, world.conservation.id
        );
        let (status, body) = send(&app, "GET", &topics_uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let unlocked: Vec<_> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["unlocked"].as_bool().unwrap())
            .collect();
        assert_eq!(unlocked, vec![true, false, false]);
        assert_eq!(body[0]["id"], json!(world.topics[0].id));

        let eligibility_uri = format!(
            "/api/students/{}/conservations/{}/eligibility",
            world.student.id, world.conservation.id
        );
        let (status, body) = send(&app, "GET", &eligibility_uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "completedTopics": 0, "totalTopics": 3, "eligibleForFinal": false })
        );

        let access_uri = format!(
            "/api/students/{}/topics/{}/access",
            world.student.id, world.topics[1].id
        );
        let (_, body) = send(&app, "GET", &access_uri, None).await;
        assert_eq!(body, json!({ "unlocked": false, "completed": false }));
    }

    #[tokio::test]
    async fn test_dashboard_and_badges_routes() {
        let world = World::new();
        let app = app(&world);
        send(
            &app,
            "POST",
            "/api/assessments/submit",
            Some(json!({
                "assessmentId": world.topic_assessments[0].id,
                "studentId": world.student.id,
                "answers": KEYS
            })),
        )
        .await;

        let (status, body) =
            send(&app, "GET", &format!("/api/students/{}/dashboard", world.student.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["conservations"][0]["progress"]["completedTopics"], 1);
        assert_eq!(body["conservations"][0]["progress"]["unlocked"], true);
        assert_eq!(body["totalProgress"]["completedAssessments"], 1);

        let (status, body) =
            send(&app, "GET", &format!("/api/students/{}/badges", world.student.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalBadges"], 2);
        assert_eq!(body["totalPoints"], 20);

        let (status, body) =
            send(&app, "GET", &format!("/api/students/{}/progress", world.student.id), None).await;
        assert_eq!(status, StatusCode::OK);
        let topic = world.topics[0].id.to_string();
        assert_eq!(body["topics"][&topic]["completed"], true);
    }

    #[tokio::test]
    async fn test_badge_catalog_routes() {
        let world = World::new();
        let app = app(&world);
        let (status, created) = send(
            &app,
            "POST",
            "/api/badges",
            Some(json!({
                "name": "Wildlife Expert",
                "description": "Knows the bush",
                "type": "WILDLIFE_EXPERT",
                "iconUrl": "/badges/wildlife.svg",
                "points": 5
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["type"], "WILDLIFE_EXPERT");

        let (_, list) = send(&app, "GET", "/api/badges", None).await;
        let list = list.as_array().unwrap();
        assert_eq!(list.len(), 4);
        assert_eq!(list[0]["name"], "Wildlife Expert");

        let (status, _) = send(
            &app,
            "POST",
            "/api/badges",
            Some(json!({
                "name": "Impossible",
                "description": "",
                "type": "ASSESSMENT_EXCELLENCE",
                "iconUrl": "/x.svg",
                "requiredScore": 140
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
