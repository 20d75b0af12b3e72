use crate::agent::state::WorkflowState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Continue,
    StopSuccess,
    StopExhausted,
}

/// decide what follows a completed attempt. pure; reads the state only.
///
/// a result always wins. otherwise the budget is spent once
/// `iteration_count` reaches `max_iterations`.
pub fn decide(state: &WorkflowState) -> Route {
    if state.result().is_some() {
        Route::StopSuccess
    } else if state.iteration_count() >= state.max_iterations() {
        Route::StopExhausted
    } else {
        Route::Continue
    }
}
