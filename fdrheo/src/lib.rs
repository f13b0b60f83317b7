// file collaborator
pub mod data {
    pub mod file;
}

// parameter bundle and unit normalization
pub mod params;
pub mod results;
pub mod piezo_table;

// analysis routines
pub mod routines;

// result store, session state and batch orchestration
pub mod store;
pub mod session;
pub mod compute;

// synthetic force curve files
pub mod sim;
