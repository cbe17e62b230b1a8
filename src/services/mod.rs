pub mod activity;
pub mod assignments;
pub mod courses;
pub mod directory;
pub mod enrollments;
pub mod grades;
pub mod skill_tags;
pub mod submissions;

pub use assignments::AssignmentService;
pub use courses::CourseService;
pub use directory::DirectoryService;
pub use enrollments::EnrollmentService;
pub use grades::GradeService;
pub use skill_tags::SkillTagService;
pub use submissions::SubmissionService;
