use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::analytics::ClassAnalyzer;
use crate::data::load_roster;
use crate::database::{Database, StudentRecord};
use crate::error::{Result, TrackerError};
use crate::features::{FeatureInput, FeatureVector, GradeLabel, ProbabilityMap};
use crate::model::{GradeClassifier, ModelInfo};
use crate::recommendations::get_recommendations;
use crate::risk::{compute_risk, RiskAssessment};

#[derive(Deserialize)]
pub struct StudentRequest {
    pub name: String,
    #[serde(flatten)]
    pub features: FeatureInput,
}

#[derive(Deserialize)]
pub struct RiskRequest {
    #[serde(flatten)]
    pub features: FeatureInput,
    pub probabilities: Option<ProbabilityMap>,
}

#[derive(Deserialize)]
pub struct StudentQuery {
    pub name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Assessment {
    pub grade: GradeLabel,
    pub probabilities: ProbabilityMap,
    pub risk: RiskAssessment,
    pub recommendations: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct StudentResponse {
    pub student: StudentRecord,
    pub assessment: Assessment,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ImportSummary {
    pub imported: usize,
    pub grade_counts: Vec<(GradeLabel, usize)>,
    pub students: Vec<StudentRecord>,
}

/// Parses and range-checks request features.
fn parse_features(input: FeatureInput) -> Result<FeatureVector> {
    let features = FeatureVector::try_from(input)?;
    features.validate()?;
    Ok(features)
}

fn parse_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TrackerError::invalid("student name is required"));
    }
    Ok(name.to_string())
}

fn assess(model: &GradeClassifier, features: &FeatureVector) -> Result<Assessment> {
    let (grade, probabilities) = model.predict(features)?;
    Ok(Assessment {
        grade,
        probabilities,
        risk: compute_risk(features, Some(&probabilities)),
        recommendations: get_recommendations(features),
    })
}

async fn fetch_record(db: &Database, id: i64) -> Result<StudentRecord> {
    db.get_student(id).await?.ok_or(TrackerError::NotFound(id))
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().body("Student Performance Tracker is running")
}

async fn get_model_info(model: web::Data<GradeClassifier>) -> HttpResponse {
    let info: ModelInfo = model.info();
    HttpResponse::Ok().json(info)
}

async fn predict(
    req: web::Json<FeatureInput>,
    model: web::Data<GradeClassifier>,
) -> Result<HttpResponse> {
    let features = parse_features(req.into_inner())?;
    let assessment = assess(&model, &features)?;
    tracing::debug!("Predicted {} (risk {:.2})", assessment.grade, assessment.risk.score);
    Ok(HttpResponse::Ok().json(assessment))
}

async fn recommendations(req: web::Json<FeatureInput>) -> Result<HttpResponse> {
    let features = parse_features(req.into_inner())?;
    Ok(HttpResponse::Ok().json(get_recommendations(&features)))
}

async fn risk(req: web::Json<RiskRequest>) -> Result<HttpResponse> {
    let RiskRequest {
        features,
        probabilities,
    } = req.into_inner();
    let features = parse_features(features)?;
    if let Some(probs) = &probabilities {
        probs.validate()?;
    }
    Ok(HttpResponse::Ok().json(compute_risk(&features, probabilities.as_ref())))
}

async fn create_student(
    req: web::Json<StudentRequest>,
    model: web::Data<GradeClassifier>,
    db: web::Data<Database>,
) -> Result<HttpResponse> {
    let StudentRequest { name, features } = req.into_inner();
    let name = parse_name(&name)?;
    let features = parse_features(features)?;
    let assessment = assess(&model, &features)?;

    let id = db.add_student(&name, &features, assessment.grade).await?;
    tracing::info!("Added student {} ({}) with grade {}", id, name, assessment.grade);

    let student = fetch_record(&db, id).await?;
    Ok(HttpResponse::Created().json(StudentResponse {
        student,
        assessment,
    }))
}

async fn list_students(
    query: web::Query<StudentQuery>,
    db: web::Data<Database>,
) -> Result<HttpResponse> {
    let students = match query.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => db.get_students_by_name(name).await?,
        _ => db.get_all_students().await?,
    };
    Ok(HttpResponse::Ok().json(students))
}

async fn get_student(path: web::Path<i64>, db: web::Data<Database>) -> Result<HttpResponse> {
    let student = fetch_record(&db, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(student))
}

async fn update_student(
    path: web::Path<i64>,
    req: web::Json<StudentRequest>,
    model: web::Data<GradeClassifier>,
    db: web::Data<Database>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let StudentRequest { name, features } = req.into_inner();
    let name = parse_name(&name)?;
    let features = parse_features(features)?;
    let assessment = assess(&model, &features)?;

    if !db.update_student(id, &name, &features, assessment.grade).await? {
        return Err(TrackerError::NotFound(id));
    }
    tracing::info!("Updated student {} with grade {}", id, assessment.grade);

    let student = fetch_record(&db, id).await?;
    Ok(HttpResponse::Ok().json(StudentResponse {
        student,
        assessment,
    }))
}

async fn delete_student(path: web::Path<i64>, db: web::Data<Database>) -> Result<HttpResponse> {
    let id = path.into_inner();
    if !db.remove_student(id).await? {
        return Err(TrackerError::NotFound(id));
    }
    tracing::info!("Removed student {}", id);
    Ok(HttpResponse::NoContent().finish())
}

/// Every row is parsed and range-checked first, then all rows are stored in one transaction.
async fn import_students(
    body: String,
    model: web::Data<GradeClassifier>,
    db: web::Data<Database>,
) -> Result<HttpResponse> {
    let rows = load_roster(body.as_bytes())?;
    if rows.is_empty() {
        return Err(TrackerError::invalid("roster contains no students"));
    }

    let mut graded = Vec::with_capacity(rows.len());
    for (line, (name, features)) in rows.into_iter().enumerate() {
        features
            .validate()
            .map_err(|e| TrackerError::invalid(format!("row {}: {}", line + 1, e)))?;
        let (grade, _) = model.predict(&features)?;
        graded.push((name, features, grade));
    }

    let ids = db.add_students(&graded).await?;

    let mut grade_counts: Vec<(GradeLabel, usize)> = GradeLabel::ALL.iter().map(|&g| (g, 0)).collect();
    for (_, _, grade) in &graded {
        grade_counts[grade.index()].1 += 1;
    }
    let mut students = Vec::with_capacity(ids.len());
    for id in ids {
        students.push(fetch_record(&db, id).await?);
    }
    tracing::info!("Imported {} students from roster", students.len());

    Ok(HttpResponse::Ok().json(ImportSummary {
        imported: students.len(),
        grade_counts,
        students,
    }))
}

async fn class_report(db: web::Data<Database>) -> Result<HttpResponse> {
    let records = db.get_all_students().await?;
    let report = ClassAnalyzer::new().generate_class_report(&records);
    Ok(HttpResponse::Ok().json(report))
}

/// Registers every route. Malformed JSON bodies, path segments and query strings answer with the
/// same error shape as other invalid input.
pub fn configure(cfg: &mut web::ServiceConfig) {
    let json_config = web::JsonConfig::default()
        .error_handler(|err, _req| TrackerError::invalid(err.to_string()).into());
    let path_config = web::PathConfig::default()
        .error_handler(|err, _req| TrackerError::invalid(err.to_string()).into());
    let query_config = web::QueryConfig::default()
        .error_handler(|err, _req| TrackerError::invalid(err.to_string()).into());

    cfg.app_data(json_config)
        .app_data(path_config)
        .app_data(query_config)
        .route("/health", web::get().to(health_check))
        .route("/model/info", web::get().to(get_model_info))
        .route("/predict", web::post().to(predict))
        .route("/recommendations", web::post().to(recommendations))
        .route("/risk", web::post().to(risk))
        .route("/students/import", web::post().to(import_students))
        .service(
            web::resource("/students")
                .route(web::get().to(list_students))
                .route(web::post().to(create_student)),
        )
        .service(
            web::resource("/students/{id}")
                .route(web::get().to(get_student))
                .route(web::put().to(update_student))
                .route(web::delete().to(delete_student)),
        )
        .route("/reports/class", web::get().to(class_report));
}
