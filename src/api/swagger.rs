use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Health Risk API",
        description = "Stores chatbot health submissions, computes insurance and diabetes \
            risk scores and keeps the records in sync with a Google Sheet.\n\n\
            **Features:**\n\
            - Record submission with risk scoring\n\
            - Ad-hoc risk scoring\n\
            - Store ↔ spreadsheet synchronization (one sync at a time)\n\
            - Sync status and history"
    ),
    paths(
        // Health
        crate::api::health::root,
        crate::api::health::health_check,

        // Records
        crate::api::users::create_user,
        crate::api::users::list_users,
        crate::api::users::delete_users,

        // Risk
        crate::api::risk_scores::compute_risk_scores,

        // Sync
        crate::api::sync::test_connection,
        crate::api::sync::sync_to_sheets,
        crate::api::sync::sync_from_sheets,
        crate::api::sync::sync_bidirectional,
        crate::api::sync::sync_status,
        crate::api::sync::sync_history,
    ),
    components(
        schemas(
            crate::api::health::RootResponse,
            crate::api::health::HealthResponse,
            crate::api::sync::ConnectionResponse,
            crate::models::UserRecord,
            crate::models::UserProfile,
            crate::models::CreateUserRequest,
            crate::models::RiskScoresResponse,
            crate::models::DeleteUsersResponse,
            crate::models::SyncState,
            crate::models::SyncStatus,
            crate::models::SyncDirection,
            crate::models::SyncCounts,
            crate::models::SyncErrorDetail,
            crate::models::SyncLogEntry,
        )
    ),
    tags(
        (
            name = "Health",
            description = "Service info and health check, including a database ping."
        ),
        (
            name = "Users",
            description = "Chatbot submissions. Scores are computed when a record is stored."
        ),
        (name = "Risk", description = "Risk scoring without persistence."),
        (
            name = "Sync",
            description = "Synchronization between the record store and the spreadsheet. \
                A request made while another sync runs is rejected with 409."
        ),
    )
)]
pub struct ApiDoc;
