use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tokio::sync::Mutex;

use crate::auth::google::OauthStateStore;
use crate::config::Config;
use crate::outbound::{Mailer, SmsGateway};
use crate::store::TreeStore;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub store: TreeStore,
    pub config: Config,
    pub mailer: Arc<dyn Mailer>,
    pub sms: Arc<dyn SmsGateway>,
    pub oauth_states: Arc<Mutex<OauthStateStore>>,
}
