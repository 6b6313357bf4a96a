pub mod organization;
pub mod report;
pub mod report_history;
pub mod user;

pub use organization::{Entity as Organization, Model as OrganizationModel, OrgKind};
pub use report::{Entity as Report, Model as ReportModel, SchemaType};
pub use report_history::{Entity as ReportHistoryEntry, Model as ReportHistoryModel};
pub use user::{Entity as User, Model as UserModel, Role};
