use crate::features::FeatureVector;

pub const KEEP_IT_UP: &str = "Great job! Maintain consistency to keep your performance high.";

/// Study advice from fixed thresholds, in a fixed order. Never empty.
pub fn get_recommendations(f: &FeatureVector) -> Vec<String> {
    let mut recommendations = Vec::new();

    if f.attendance < 75.0 {
        recommendations.push("Improve attendance to at least 85% for better outcomes.".to_string());
    }

    if f.marks < 70.0 {
        recommendations.push("Focus on core subjects to raise marks above 80%.".to_string());
    }

    if f.assignments < 70.0 {
        recommendations.push("Complete and revise assignments to boost assignment score.".to_string());
    }

    if f.study_hours < 10.0 {
        recommendations.push("Increase study hours to at least 12-15 hours/week.".to_string());
    }

    if f.extracurriculars < 3.0 {
        recommendations.push(
            "Engage in extracurricular activities to build balance and soft skills.".to_string(),
        );
    }

    if recommendations.is_empty() {
        recommendations.push(KEEP_IT_UP.to_string());
    }

    recommendations
}
