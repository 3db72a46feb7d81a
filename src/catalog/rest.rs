//! REST variant: `METHOD /api/<resource>[/<id>][/<sub-resource>]`.

use super::{Catalog, Category, Kind, Operation, Params, Protocol, RequestTemplate, DETAIL_PROBABILITY};
use crate::classifier::{check_status, rest_created_id, Failure};
use crate::executor::{Method, Outcome, WireRequest};
use serde_json::{json, Value};

const OK: &[u16] = &[200];
const CREATED: &[u16] = &[201, 200];

/// One REST endpoint: method, path builder, optional JSON payload builder,
/// and the status codes counted as success.
#[derive(Debug, Clone, Copy)]
pub struct RestTemplate {
    method: Method,
    path: fn(&Params) -> String,
    payload: Option<fn(&Params) -> Value>,
    accept: &'static [u16],
}

impl RestTemplate {
    pub fn get(path: fn(&Params) -> String) -> Self {
        Self { method: Method::Get, path, payload: None, accept: OK }
    }

    pub fn post(path: fn(&Params) -> String, payload: fn(&Params) -> Value) -> Self {
        Self { method: Method::Post, path, payload: Some(payload), accept: CREATED }
    }

    pub fn put(path: fn(&Params) -> String, payload: fn(&Params) -> Value) -> Self {
        Self { method: Method::Put, path, payload: Some(payload), accept: OK }
    }

    pub fn delete(path: fn(&Params) -> String) -> Self {
        Self { method: Method::Delete, path, payload: None, accept: OK }
    }
}

impl RequestTemplate for RestTemplate {
    fn build(&self, params: &Params) -> WireRequest {
        WireRequest {
            method: self.method,
            path: (self.path)(params),
            body: self.payload.map(|payload| payload(params)),
        }
    }

    fn check(&self, outcome: &Outcome) -> Result<(), Failure> {
        check_status(self.accept, outcome)
    }

    fn created_id(&self, outcome: &Outcome) -> Option<u64> {
        rest_created_id(outcome)
    }
}

// ============================================================================
// Payloads
// ============================================================================
//
// Dates are unix seconds; names carry the millisecond stamp for uniqueness.

fn unix_secs(p: &Params) -> i64 {
    p.stamp / 1000
}

fn assignment_payload(p: &Params, verb: &str, grade: u32, due_in: i64) -> Value {
    json!({
        "course": p.baseline.course,
        "name": format!("{verb} Assignment {}", p.stamp),
        "intro": format!("{verb} assignment from the load generator"),
        "section": p.baseline.section,
        "duedate": unix_secs(p) + due_in,
        "allowsubmissionsfromdate": unix_secs(p),
        "grade": grade,
        "introformat": 1
    })
}

fn course_payload(p: &Params, verb: &str, prefix: &str, sortorder: u32, length: i64) -> Value {
    json!({
        "category": 1,
        "sortorder": sortorder,
        "fullname": format!("{verb} Course {}", p.stamp),
        "shortname": format!("{prefix}{}", p.stamp),
        "idnumber": format!("{prefix}-{}", p.stamp),
        "summary": format!("{verb} course from the load generator"),
        "format": "topics",
        "startdate": unix_secs(p),
        "enddate": unix_secs(p) + length,
        "visible": 1
    })
}

fn enrollment_payload(p: &Params, length: i64) -> Value {
    json!({
        "enrolid": 1,
        "userid": p.baseline.user,
        "courseid": p.baseline.course,
        "status": 0,
        "timestart": unix_secs(p),
        "timeend": unix_secs(p) + length
    })
}

fn section_payload(p: &Params, verb: &str) -> Value {
    json!({
        "course": p.baseline.course,
        "name": format!("{verb} Section {}", p.stamp),
        "summary": format!("{verb} section from the load generator"),
        "visible": 1
    })
}

fn new_role(p: &Params) -> Value {
    json!({
        "name": format!("Test Role {}", p.stamp),
        "shortname": format!("testrole-{}", p.stamp),
        "description": "Test role from the load generator",
        "sortorder": 1,
        "archetype": "student"
    })
}

fn new_submission(p: &Params) -> Value {
    json!({
        "assignment": p.baseline.assignment,
        "userid": p.baseline.user,
        "status": "submitted",
        "groupid": 0,
        "attemptnumber": 0
    })
}

const WEEK: i64 = 604_800;
const THIRTY_DAYS: i64 = 2_592_000;
const SIXTY_DAYS: i64 = 5_184_000;

pub(super) fn catalog() -> Catalog {
    let core = vec![
        Operation::query("response_time_home", "home endpoint is status 200", RestTemplate::get(|_| "/".into())),
        Operation::query("response_time_users", "users endpoint is status 200", RestTemplate::get(|_| "/api/users".into())),
        Operation::query(
            "response_time_categories",
            "categories endpoint is status 200",
            RestTemplate::get(|_| "/api/categories".into()),
        ),
        Operation::query("response_time_roles", "roles endpoint is status 200", RestTemplate::get(|_| "/api/roles".into())),
        Operation::query("response_time_courses", "courses endpoint is status 200", RestTemplate::get(|_| "/api/courses".into())),
        Operation::query(
            "response_time_assignments",
            "assignments endpoint is status 200",
            RestTemplate::get(|p| format!("/api/assignments/{}", p.baseline.assignment)),
        ),
        Operation::query(
            "response_time_assignments_prox",
            "assignmentsProx endpoint is status 200",
            RestTemplate::get(|_| "/api/assignments".into()),
        ),
        Operation::query("response_time_sections", "sections endpoint is status 200", RestTemplate::get(|_| "/api/sections".into())),
    ];

    let detail = vec![
        Operation::query(
            "response_time_user_by_id",
            "userById endpoint is status 200",
            RestTemplate::get(|p| format!("/api/users/{}", p.baseline.user)),
        ),
        Operation::query(
            "response_time_role_by_id",
            "roleById endpoint is status 200",
            RestTemplate::get(|p| format!("/api/roles/{}", p.pick)),
        ),
        Operation::query(
            "response_time_course_by_id",
            "courseById endpoint is status 200",
            RestTemplate::get(|p| format!("/api/courses/{}", p.baseline.course)),
        ),
        Operation::query(
            "response_time_sections_by_course",
            "courseSections endpoint is status 200",
            RestTemplate::get(|p| format!("/api/sections/{}", p.baseline.course)),
        ),
        Operation::query(
            "response_time_curso_assignments",
            "cursoAssignments endpoint is status 200",
            RestTemplate::get(|p| format!("/api/courses/{}/assignments", p.baseline.course)),
        ),
        // No per-section endpoint exists; the course listing stands in for it.
        Operation::query(
            "response_time_seccion_assignments",
            "seccionAssignments endpoint is status 200",
            RestTemplate::get(|p| format!("/api/courses/{}/assignments", p.baseline.course)),
        ),
        Operation::query(
            "response_time_all_assignments",
            "allAssignments endpoint is status 200",
            RestTemplate::get(|_| "/api/assignments".into()),
        ),
        Operation::query(
            "response_time_enrollments_by_course",
            "enrollmentsByCourse endpoint is status 200",
            RestTemplate::get(|p| format!("/api/courses/{}/enrollments", p.baseline.course)),
        ),
        Operation::query(
            "response_time_enrollments_by_user",
            "enrollmentsByUser endpoint is status 200",
            RestTemplate::get(|p| format!("/api/users/{}/enrollments", p.baseline.user)),
        ),
        Operation::query(
            "response_time_submissions_by_assignment",
            "submissionsByAssignment endpoint is status 200",
            RestTemplate::get(|p| format!("/api/assignments/{}/submissions", p.baseline.assignment)),
        ),
        Operation::query(
            "response_time_submissions_by_user",
            "submissionsByUser endpoint is status 200",
            RestTemplate::get(|p| format!("/api/users/{}/submissions", p.baseline.user)),
        ),
    ];

    let creates = vec![
        Operation::mutation(
            Category::Create,
            Kind::Assignment,
            0.30,
            "response_time_post_assignment",
            "create assignment is status 201",
            RestTemplate::post(
                |p| format!("/api/courses/{}/assignments", p.baseline.course),
                |p| assignment_payload(p, "Test", 100, WEEK),
            ),
        ),
        Operation::mutation(
            Category::Create,
            Kind::Course,
            0.20,
            "response_time_post_course",
            "create course is status 201",
            RestTemplate::post(|_| "/api/courses".into(), |p| course_payload(p, "Test", "TC", 1, THIRTY_DAYS)),
        ),
        Operation::mutation(
            Category::Create,
            Kind::Enrollment,
            0.30,
            "response_time_post_enrollment",
            "create enrollment is status 201",
            RestTemplate::post(|_| "/api/enrollments".into(), |p| enrollment_payload(p, THIRTY_DAYS)),
        ),
        Operation::mutation(
            Category::Create,
            Kind::Role,
            0.20,
            "response_time_post_role",
            "create role is status 201",
            RestTemplate::post(|_| "/api/roles".into(), new_role),
        ),
        Operation::mutation(
            Category::Create,
            Kind::Section,
            0.30,
            "response_time_post_section",
            "create section is status 201",
            RestTemplate::post(|_| "/api/sections".into(), |p| section_payload(p, "Test")),
        ),
        Operation::mutation(
            Category::Create,
            Kind::Submission,
            0.30,
            "response_time_post_submission",
            "create submission is status 201",
            RestTemplate::post(
                |p| format!("/api/assignments/{}/submissions", p.baseline.assignment),
                new_submission,
            ),
        ),
    ];

    let updates = vec![
        Operation::mutation(
            Category::Update,
            Kind::Assignment,
            0.25,
            "response_time_put_assignment",
            "update assignment is status 200",
            RestTemplate::put(
                |p| format!("/api/assignments/{}", p.target),
                |p| assignment_payload(p, "Updated", 90, 2 * WEEK),
            ),
        ),
        Operation::mutation(
            Category::Update,
            Kind::Course,
            0.25,
            "response_time_put_course",
            "update course is status 200",
            RestTemplate::put(
                |p| format!("/api/courses/{}", p.target),
                |p| course_payload(p, "Updated", "UC", 2, SIXTY_DAYS),
            ),
        ),
        Operation::mutation(
            Category::Update,
            Kind::Enrollment,
            0.25,
            "response_time_put_enrollment",
            "update enrollment is status 200",
            RestTemplate::put(|p| format!("/api/enrollments/{}", p.target), |p| enrollment_payload(p, SIXTY_DAYS)),
        ),
        Operation::mutation(
            Category::Update,
            Kind::Section,
            0.25,
            "response_time_put_section",
            "update section is status 200",
            RestTemplate::put(|p| format!("/api/sections/{}", p.target), |p| section_payload(p, "Updated")),
        ),
    ];

    let deletes = vec![
        Operation::mutation(
            Category::Delete,
            Kind::Submission,
            0.20,
            "response_time_delete_submission",
            "delete submission is status 200",
            RestTemplate::delete(|p| format!("/api/submissions/{}", p.target)),
        ),
        Operation::mutation(
            Category::Delete,
            Kind::Enrollment,
            0.20,
            "response_time_delete_enrollment",
            "delete enrollment is status 200",
            RestTemplate::delete(|p| format!("/api/enrollments/{}", p.target)),
        ),
        Operation::mutation(
            Category::Delete,
            Kind::Section,
            0.20,
            "response_time_delete_section",
            "delete section is status 200",
            RestTemplate::delete(|p| format!("/api/sections/{}", p.target)),
        ),
        Operation::mutation(
            Category::Delete,
            Kind::Role,
            0.20,
            "response_time_delete_role",
            "delete role is status 200",
            RestTemplate::delete(|p| format!("/api/roles/{}", p.target)),
        ),
        Operation::mutation(
            Category::Delete,
            Kind::Assignment,
            0.20,
            "response_time_delete_assignment",
            "delete assignment is status 200",
            RestTemplate::delete(|p| format!("/api/assignments/{}", p.target)),
        ),
    ];

    Catalog {
        protocol: Protocol::Rest,
        core,
        detail,
        detail_probability: DETAIL_PROBABILITY,
        creates,
        updates,
        deletes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Baseline;

    fn params() -> Params {
        Params::new(Baseline::default(), 1_700_000_000_123)
    }

    #[test]
    fn test_update_addresses_target_id() {
        let catalog = catalog();
        let op = catalog.find("response_time_put_course").unwrap();
        let request = op.build(&params().with_target(42));
        assert_eq!(request.method, Method::Put);
        assert_eq!(request.path, "/api/courses/42");
        let body = request.body.unwrap();
        assert_eq!(body["fullname"], "Updated Course 1700000000123");
        assert_eq!(body["startdate"], 1_700_000_000);
    }

    #[test]
    fn test_create_nests_under_baseline() {
        let catalog = catalog();
        let op = catalog.find("response_time_post_assignment").unwrap();
        let request = op.build(&params());
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.path, "/api/courses/1/assignments");
        assert_eq!(request.body.unwrap()["grade"], 100);
    }

    #[test]
    fn test_role_lookup_uses_pick() {
        let catalog = catalog();
        let op = catalog.find("response_time_role_by_id").unwrap();
        assert_eq!(op.build(&params().with_pick(4)).path, "/api/roles/4");
    }

    #[test]
    fn test_delete_has_no_body() {
        let catalog = catalog();
        let op = catalog.find("response_time_delete_submission").unwrap();
        assert_eq!(op.build(&params().with_target(7)), WireRequest::delete("/api/submissions/7"));
    }
}
