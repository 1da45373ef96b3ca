use std::process;

fn main() {
    if let Err(err) = authentik_provisioner::run() {
        // Print the main error message
        eprintln!("ERROR: {}", err);

        // If available, print the error chain to provide more context
        let mut source = err.source();
        if source.is_some() {
            eprintln!("\nError details:");
            while let Some(err) = source {
                eprintln!("  - {}", err);
                source = err.source();
            }

            eprintln!("\nTroubleshooting tips:");
            eprintln!("  - Ensure that the Authentik instance is running and reachable");
            eprintln!("  - Check AUTHENTIK_URL and AUTHENTIK_API_TOKEN in authentik.env");
            eprintln!("  - Verify the API token may manage users and groups");
        }

        process::exit(1);
    }
}
