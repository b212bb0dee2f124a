//! Multi-device fan-out against a SQLite session store.
//!
//! Run with: cargo run -p session-store --example fanout
//! Set RUST_LOG=session_store=debug to see store activity.

use session_store::{
    AddressLocks, PeerAddress, SessionState, SessionStore, SessionStoreError, SessionTransaction,
    SqliteSessionStore,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Session Fan-out Example ===\n");

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("sessions.db");
    let store = SqliteSessionStore::open(&path, [0x42u8; 32])?;
    let locks = AddressLocks::new();

    println!("Step 1: Establishing sessions with three of Bob's devices...\n");
    for device in [1u32, 2, 7] {
        let address = PeerAddress::new("bob", device);
        let mut tx = SessionTransaction::begin(&store, &locks, address.clone())?;
        tx.record_mut()
            .set_current_state(SessionState::new(format!("ratchet for {}", address).into_bytes()));
        tx.commit()?;
        println!("  Session stored for {}", address);
    }
    println!();

    println!("Step 2: Discovering Bob's devices...\n");
    let devices = store.get_sub_device_sessions("bob")?;
    println!("  Devices: {:?}", devices);
    println!();

    println!("Step 3: Loading every session for delivery...\n");
    let targets: Vec<PeerAddress> = devices
        .iter()
        .map(|device| PeerAddress::new("bob", device.get()))
        .collect();
    for (address, record) in targets.iter().zip(store.load_existing_sessions(&targets)?) {
        let state = record.current_state().map(|s| s.len()).unwrap_or(0);
        println!("  {} -> {} bytes of state", address, state);
    }
    println!();

    println!("Step 4: Strict lookup including an unknown device...\n");
    let mut with_unknown = targets.clone();
    with_unknown.push(PeerAddress::new("bob", 9));
    match store.load_existing_sessions(&with_unknown) {
        Err(SessionStoreError::NoSession { address }) => {
            println!("  Refused: no session for {}", address)
        }
        other => println!("  Unexpected result: {:?}", other.map(|r| r.len())),
    }
    println!();

    println!("Step 5: Bob resets; deleting all his sessions...\n");
    store.delete_all_sessions("bob")?;
    println!(
        "  Remaining devices: {:?}",
        store.get_sub_device_sessions("bob")?
    );

    println!("\n=== Example Complete ===");
    Ok(())
}
