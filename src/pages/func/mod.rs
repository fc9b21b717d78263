mod customer;
mod progress;
mod report;
mod target;

use axum::Router;

use crate::AppState;

pub use customer::CustomerDetail;

pub fn func_router() -> Router<AppState> {
    customer::customer_router()
        .merge(progress::progress_router())
        .merge(target::target_router())
        .merge(report::report_router())
}

#[cfg(test)]
pub(crate) async fn demo_state() -> (AppState, crate::seed::DemoOrg) {
    let state = AppState::in_memory(crate::Config::for_tests());
    let org = crate::seed::seed_demo_org(state.store.as_ref())
        .await
        .unwrap()
        .unwrap();
    (state, org)
}
