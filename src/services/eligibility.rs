use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::entities::{enrollment, order::CourseMeta};
use crate::errors::ServiceError;

fn unique_titles<'a>(lines: impl Iterator<Item = &'a CourseMeta>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    lines
        .filter(|line| seen.insert(line.id))
        .map(|line| line.course_title.as_str())
        .collect()
}

/// Courses bought both directly and through a bundle, or through two bundles.
pub fn overlapping_titles(courses: &[CourseMeta]) -> Vec<&str> {
    let direct: HashSet<Uuid> = courses
        .iter()
        .filter(|line| !line.is_bundled())
        .map(|line| line.id)
        .collect();

    let mut bundles_per_course: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
    for line in courses {
        if let Some(bundle_id) = line.bundle_id {
            bundles_per_course.entry(line.id).or_default().insert(bundle_id);
        }
    }

    unique_titles(courses.iter().filter(|line| {
        bundles_per_course
            .get(&line.id)
            .is_some_and(|bundles| direct.contains(&line.id) || bundles.len() > 1)
    }))
}

/// Courses the user already holds a current enrollment for.
pub fn enrolled_titles<'a>(
    courses: &'a [CourseMeta],
    enrollments: &[enrollment::Model],
    now: DateTime<Utc>,
) -> Vec<&'a str> {
    let current: HashSet<Uuid> = enrollments
        .iter()
        .filter(|e| e.is_current(now))
        .map(|e| e.course_id)
        .collect();

    unique_titles(courses.iter().filter(|line| current.contains(&line.id)))
}

/// Runs both checks and reports every offending course in one conflict.
pub fn check_eligibility(
    courses: &[CourseMeta],
    enrollments: &[enrollment::Model],
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let mut problems = Vec::new();

    let overlapping = overlapping_titles(courses);
    if !overlapping.is_empty() {
        problems.push(format!(
            "courses already included in a selected bundle: {}",
            overlapping.join(", ")
        ));
    }

    let enrolled = enrolled_titles(courses, enrollments, now);
    if !enrolled.is_empty() {
        problems.push(format!("already enrolled in: {}", enrolled.join(", ")));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::Conflict(problems.join("; ")))
    }
}

/// Loads the user's enrollments for the given courses, expired ones included.
pub async fn load_enrollments<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    course_ids: Vec<Uuid>,
) -> Result<Vec<enrollment::Model>, ServiceError> {
    if course_ids.is_empty() {
        return Ok(Vec::new());
    }

    Ok(enrollment::Entity::find()
        .filter(enrollment::Column::UserId.eq(user_id))
        .filter(enrollment::Column::CourseId.is_in(course_ids))
        .all(db)
        .await?)
}
