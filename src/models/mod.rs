pub mod student;
pub mod workshop;

pub use student::{
    AdminLoginRequest, NewStudent, RefreshRequest, SignUpRequest, Student, StudentChanges,
    StudentFilter, StudentLoginRequest, StudentView, UpdateStudentRequest, normalize_email,
};
pub use workshop::{
    NewWorkshop, NewWorkshopRequest, Registration, UpdateWorkshopRequest, Workshop,
    WorkshopChanges, WorkshopFilter, WorkshopView, compute_availability,
};
