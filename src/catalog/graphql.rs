//! GraphQL variant: every operation is a single `POST <endpoint>` carrying
//! `{"query": "..."}`; responses use the `{"data": ..., "errors": [...]}` envelope.

use super::{Catalog, Category, Kind, Operation, Params, Protocol, RequestTemplate, RestTemplate, DETAIL_PROBABILITY};
use crate::classifier::{check_graphql, graphql_created_id, Failure};
use crate::executor::{Outcome, WireRequest};
use chrono::{DateTime, SecondsFormat};
use serde_json::json;

/// One named query or mutation. `field` is the top-level data key the
/// response must carry.
#[derive(Debug, Clone)]
pub struct GraphqlTemplate {
    endpoint: String,
    field: &'static str,
    document: fn(&Params) -> String,
}

impl GraphqlTemplate {
    pub fn new(endpoint: &str, field: &'static str, document: fn(&Params) -> String) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            field,
            document,
        }
    }
}

impl RequestTemplate for GraphqlTemplate {
    fn build(&self, params: &Params) -> WireRequest {
        WireRequest::post(self.endpoint.clone(), json!({ "query": (self.document)(params) }))
    }

    fn check(&self, outcome: &Outcome) -> Result<(), Failure> {
        check_graphql(self.field, outcome)
    }

    fn created_id(&self, outcome: &Outcome) -> Option<u64> {
        graphql_created_id(self.field, outcome)
    }
}

// ============================================================================
// Selection sets
// ============================================================================

const USER_FIELDS: &str = "id username firstname lastname email confirmed deleted suspended institution department timecreated timemodified";
const COURSE_FIELDS: &str = "id category sortorder fullname shortname idnumber summary format showgrades newsitems startdate enddate visible groupmode timecreated timemodified";
const SECTION_FIELDS: &str = "id course section name summary sequence visible availability timemodified";
const CATEGORY_FIELDS: &str = "id name idnumber description parent sortorder coursecount visible visibleold timemodified depth path theme";
const ROLE_FIELDS: &str = "id name shortname description sortorder archetype";
const ASSIGNMENT_FIELDS: &str = "id course name intro section duedate allowsubmissionsfromdate grade timemodified completionsubmit cutoffdate gradingduedate";
const SUBMISSION_FIELDS: &str = "id assignment userid timecreated timemodified status groupid attemptnumber latest";
const ENROLLMENT_FIELDS: &str = "id enrolid userid courseid status timestart timeend timecreated timemodified";

/// ISO-8601 UTC timestamp with millisecond precision, `offset_ms` from the stamp.
fn iso(p: &Params, offset_ms: i64) -> String {
    DateTime::from_timestamp_millis(p.stamp + offset_ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

const WEEK_MS: i64 = 604_800_000;
const THIRTY_DAYS_MS: i64 = 2_592_000_000;
const SIXTY_DAYS_MS: i64 = 5_184_000_000;

fn assignment_input(p: &Params, verb: &str, grade: u32, due_in: i64) -> String {
    format!(
        r#"{{ course: {course}, section: {section}, name: "{verb} Assignment {stamp}", intro: "{verb} assignment from the load generator", duedate: "{due}", allowsubmissionsfromdate: "{now}", grade: {grade}, completionsubmit: true, cutoffdate: null, gradingduedate: null }}"#,
        course = p.baseline.course,
        section = p.baseline.section,
        stamp = p.stamp,
        due = iso(p, due_in),
        now = iso(p, 0),
    )
}

fn course_input(p: &Params, verb: &str, prefix: &str, sortorder: u32, length: i64) -> String {
    format!(
        r#"{{ category: 1, sortorder: {sortorder}, fullname: "{verb} Course {stamp}", shortname: "{prefix}{stamp}", idnumber: "{prefix}-{stamp}", summary: "{verb} course from the load generator", format: "topics", showgrades: true, newsitems: 5, startdate: "{start}", enddate: "{end}", visible: true }}"#,
        stamp = p.stamp,
        start = iso(p, 0),
        end = iso(p, length),
    )
}

fn enrollment_input(p: &Params, length: i64) -> String {
    format!(
        r#"{{ enrolid: 1, userid: {user}, courseid: {course}, status: 0, timestart: "{start}", timeend: "{end}" }}"#,
        user = p.baseline.user,
        course = p.baseline.course,
        start = iso(p, 0),
        end = iso(p, length),
    )
}

fn role_input(p: &Params, verb: &str, prefix: &str, sortorder: u32, archetype: &str) -> String {
    format!(
        r#"{{ name: "{verb} Role {stamp}", shortname: "{prefix}-{stamp}", description: "{verb} role from the load generator", sortorder: {sortorder}, archetype: "{archetype}" }}"#,
        stamp = p.stamp,
    )
}

fn section_input(p: &Params, verb: &str) -> String {
    format!(
        r#"{{ course: {course}, name: "{verb} Section {stamp}", summary: "{verb} section from the load generator", sequence: null, visible: true }}"#,
        course = p.baseline.course,
        stamp = p.stamp,
    )
}

pub(super) fn catalog(endpoint: &str) -> Catalog {
    let q = |field: &'static str, document: fn(&Params) -> String| {
        GraphqlTemplate::new(endpoint, field, document)
    };

    let core = vec![
        Operation::query("response_time_home", "home endpoint is status 200", RestTemplate::get(|_| "/".into())),
        Operation::query(
            "response_time_users",
            "users query successful",
            q("users", |_| format!("query {{ users {{ {USER_FIELDS} }} }}")),
        ),
        Operation::query(
            "response_time_categories",
            "categories query successful",
            q("categories", |_| format!("query {{ categories {{ {CATEGORY_FIELDS} }} }}")),
        ),
        Operation::query(
            "response_time_roles",
            "roles query successful",
            q("roles", |_| format!("query {{ roles {{ {ROLE_FIELDS} }} }}")),
        ),
        Operation::query(
            "response_time_courses",
            "courses query successful",
            q("courses", |_| format!("query {{ courses {{ {COURSE_FIELDS} }} }}")),
        ),
        Operation::query(
            "response_time_assignments",
            "assignments query successful",
            q("assignments", |_| format!("query {{ assignments {{ {ASSIGNMENT_FIELDS} }} }}")),
        ),
        Operation::query(
            "response_time_assignments_prox",
            "assignmentsProx query successful",
            q("AllAssigmentsProx", |_| format!("query {{ AllAssigmentsProx {{ {ASSIGNMENT_FIELDS} }} }}")),
        ),
    ];

    let detail = vec![
        Operation::query(
            "response_time_user_by_id",
            "userById query successful",
            q("user", |p| format!("query {{ user(userId: {}) {{ {USER_FIELDS} }} }}", p.baseline.user)),
        ),
        Operation::query(
            "response_time_role_by_id",
            "roleById query successful",
            q("role", |p| format!("query {{ role(roleId: {}) {{ {ROLE_FIELDS} }} }}", p.pick)),
        ),
        Operation::query(
            "response_time_course_by_id",
            "courseById query successful",
            q("course", |p| format!("query {{ course(courseId: {}) {{ {COURSE_FIELDS} }} }}", p.baseline.course)),
        ),
        Operation::query(
            "response_time_sections_by_course",
            "courseSections query successful",
            q("courseSections", |p| {
                format!("query {{ courseSections(courseId: {}) {{ {SECTION_FIELDS} }} }}", p.baseline.course)
            }),
        ),
        Operation::query(
            "response_time_curso_assignments",
            "cursoAssignments query successful",
            q("CourseAssignmentsProx", |p| {
                format!("query {{ CourseAssignmentsProx(courseId: {}) {{ {ASSIGNMENT_FIELDS} }} }}", p.baseline.course)
            }),
        ),
        Operation::query(
            "response_time_seccion_assignments",
            "seccionAssignments query successful",
            q("assignments", |p| {
                format!(
                    "query {{ assignments(courseId: {}, sectionId: {}) {{ {ASSIGNMENT_FIELDS} }} }}",
                    p.baseline.course, p.baseline.section
                )
            }),
        ),
        Operation::query(
            "response_time_all_assignments",
            "allAssignments query successful",
            q("AllAssigments", |_| format!("query {{ AllAssigments {{ {ASSIGNMENT_FIELDS} }} }}")),
        ),
        Operation::query(
            "response_time_enrollments_by_course",
            "enrollmentsByCourse query successful",
            q("courseEnrollments", |p| {
                format!("query {{ courseEnrollments(courseId: {}) {{ {ENROLLMENT_FIELDS} }} }}", p.baseline.course)
            }),
        ),
        Operation::query(
            "response_time_enrollments_by_user",
            "enrollmentsByUser query successful",
            q("userEnrollments", |p| {
                format!(
                    "query {{ userEnrollments(userId: {}) {{ {ENROLLMENT_FIELDS} course {{ id fullname shortname visible startdate enddate }} }} }}",
                    p.baseline.user
                )
            }),
        ),
        Operation::query(
            "response_time_submissions_by_assignment",
            "submissionsByAssignment query successful",
            q("submissions", |p| {
                format!("query {{ submissions(assignmentId: {}) {{ {SUBMISSION_FIELDS} }} }}", p.baseline.assignment)
            }),
        ),
        Operation::query(
            "response_time_submissions_by_user",
            "submissionsByUser query successful",
            q("userSubmissions", |p| {
                format!("query {{ userSubmissions(userId: {}) {{ {SUBMISSION_FIELDS} }} }}", p.baseline.user)
            }),
        ),
        Operation::query(
            "response_time_sections",
            "sections query successful",
            q("sections", |p| format!("query {{ sections(courseId: {}) {{ {SECTION_FIELDS} }} }}", p.baseline.course)),
        ),
    ];

    let creates = vec![
        Operation::mutation(
            Category::Create,
            Kind::Assignment,
            0.30,
            "response_time_create_assignment",
            "create assignment successful",
            q("createAssignment", |p| {
                format!(
                    "mutation {{ createAssignment(input: {}) {{ id name course section duedate grade timemodified }} }}",
                    assignment_input(p, "Test", 100, WEEK_MS)
                )
            }),
        ),
        Operation::mutation(
            Category::Create,
            Kind::Course,
            0.20,
            "response_time_create_course",
            "create course successful",
            q("createCourse", |p| {
                format!(
                    "mutation {{ createCourse(input: {}) {{ id fullname shortname category sortorder visible startdate enddate timemodified }} }}",
                    course_input(p, "Test", "TC", 1, THIRTY_DAYS_MS)
                )
            }),
        ),
        Operation::mutation(
            Category::Create,
            Kind::Enrollment,
            0.30,
            "response_time_create_enrollment",
            "create enrollment successful",
            q("createEnrollment", |p| {
                format!(
                    "mutation {{ createEnrollment(input: {}) {{ {ENROLLMENT_FIELDS} }} }}",
                    enrollment_input(p, THIRTY_DAYS_MS)
                )
            }),
        ),
        Operation::mutation(
            Category::Create,
            Kind::Role,
            0.20,
            "response_time_create_role",
            "create role successful",
            q("createRole", |p| {
                format!(
                    "mutation {{ createRole(input: {}) {{ {ROLE_FIELDS} }} }}",
                    role_input(p, "Test", "testrole", 1, "student")
                )
            }),
        ),
        Operation::mutation(
            Category::Create,
            Kind::Section,
            0.30,
            "response_time_create_section",
            "create section successful",
            q("createSection", |p| {
                format!("mutation {{ createSection(input: {}) {{ {SECTION_FIELDS} }} }}", section_input(p, "Test"))
            }),
        ),
    ];

    let updates = vec![
        Operation::mutation(
            Category::Update,
            Kind::Assignment,
            0.25,
            "response_time_update_assignment",
            "update assignment successful",
            q("updateAssignment", |p| {
                format!(
                    "mutation {{ updateAssignment(assignmentId: {}, input: {}) {{ id name course section duedate grade timemodified }} }}",
                    p.target,
                    assignment_input(p, "Updated", 90, 2 * WEEK_MS)
                )
            }),
        ),
        Operation::mutation(
            Category::Update,
            Kind::Course,
            0.25,
            "response_time_update_course",
            "update course successful",
            q("updateCourse", |p| {
                format!(
                    "mutation {{ updateCourse(courseId: {}, input: {}) {{ id fullname shortname category visible startdate enddate timemodified }} }}",
                    p.target,
                    course_input(p, "Updated", "UC", 2, SIXTY_DAYS_MS)
                )
            }),
        ),
        Operation::mutation(
            Category::Update,
            Kind::Enrollment,
            0.25,
            "response_time_update_enrollment",
            "update enrollment successful",
            q("updateEnrollment", |p| {
                format!(
                    "mutation {{ updateEnrollment(enrollmentId: {}, input: {}) {{ id enrolid userid courseid status timestart timeend timemodified }} }}",
                    p.target,
                    enrollment_input(p, SIXTY_DAYS_MS)
                )
            }),
        ),
        Operation::mutation(
            Category::Update,
            Kind::Role,
            0.25,
            "response_time_update_role",
            "update role successful",
            q("updateRole", |p| {
                format!(
                    "mutation {{ updateRole(roleId: {}, input: {}) {{ {ROLE_FIELDS} }} }}",
                    p.target,
                    role_input(p, "Updated", "updatedrole", 2, "teacher")
                )
            }),
        ),
        Operation::mutation(
            Category::Update,
            Kind::Section,
            0.25,
            "response_time_update_section",
            "update section successful",
            q("updateSection", |p| {
                format!(
                    "mutation {{ updateSection(sectionId: {}, input: {}) {{ {SECTION_FIELDS} }} }}",
                    p.target,
                    section_input(p, "Updated")
                )
            }),
        ),
    ];

    let deletes = vec![
        Operation::mutation(
            Category::Delete,
            Kind::Enrollment,
            0.20,
            "response_time_delete_enrollment",
            "delete enrollment successful",
            q("deleteEnrollment", |p| {
                format!("mutation {{ deleteEnrollment(enrollmentId: {}) {{ id enrolid userid courseid status }} }}", p.target)
            }),
        ),
        Operation::mutation(
            Category::Delete,
            Kind::Role,
            0.20,
            "response_time_delete_role",
            "delete role successful",
            q("deleteRole", |p| format!("mutation {{ deleteRole(roleId: {}) {{ {ROLE_FIELDS} }} }}", p.target)),
        ),
        Operation::mutation(
            Category::Delete,
            Kind::Section,
            0.20,
            "response_time_delete_section",
            "delete section successful",
            q("deleteSection", |p| {
                format!("mutation {{ deleteSection(sectionId: {}) {{ id course section name visible }} }}", p.target)
            }),
        ),
    ];

    Catalog {
        protocol: Protocol::Graphql,
        core,
        detail,
        detail_probability: DETAIL_PROBABILITY,
        creates,
        updates,
        deletes,
    }
}
