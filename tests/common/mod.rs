#![allow(dead_code)]

use chrono::Duration;
use role_messenger::auth::TokenSigner;
use role_messenger::directory::FileDirectory;
use role_messenger::fanout::ChannelHub;
use role_messenger::models::employee::{ Employee, Role };
use role_messenger::rate_limit::SendRateLimiter;
use role_messenger::server::api::AppState;
use role_messenger::service::MessagingService;
use role_messenger::store::Stores;
use std::sync::Arc;

pub const SECRET: &str = "integration-secret";

pub fn staff() -> Vec<Employee> {
    vec![
        Employee::new("D", Role::Director).with_name("Dana"),
        Employee::new("H", Role::Hr).with_name("Hana"),
        Employee::new("P", Role::ProjectManager).with_name("Priya"),
        Employee::new("E", Role::Employee).with_name("Eli").with_hr("H").with_pm("P"),
        Employee::new("F", Role::Employee).with_name("Fay")
    ]
}

pub struct Harness {
    pub service: Arc<MessagingService>,
    pub directory: Arc<FileDirectory>,
    pub hub: Arc<ChannelHub>,
    pub signer: Arc<TokenSigner>,
}

impl Harness {
    pub fn new() -> Self {
        let directory = Arc::new(FileDirectory::from_employees(staff()));
        let hub = ChannelHub::new(32);
        let service = Arc::new(
            MessagingService::new(
                directory.clone(),
                Stores::in_memory(),
                SendRateLimiter::default(),
                hub.clone()
            )
        );
        let signer = Arc::new(TokenSigner::new(SECRET, Duration::hours(1)));
        Self { service, directory, hub, signer }
    }

    pub fn state(&self, api_key: Option<&str>) -> AppState {
        AppState {
            service: self.service.clone(),
            signer: self.signer.clone(),
            directory: self.directory.clone(),
            api_key: api_key.map(str::to_string),
        }
    }

    pub fn token(&self, employee_id: &str, role: Role) -> String {
        self.signer.issue(employee_id, role, chrono::Utc::now()).unwrap()
    }
}
