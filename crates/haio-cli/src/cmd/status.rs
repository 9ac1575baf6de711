use crate::output::{print_fields, print_json, print_table};
use crate::source::Source;

pub fn run(source: &Source, json: bool) -> anyhow::Result<()> {
    let status = source.open_store()?.get_status()?;

    if json {
        return print_json(&status);
    }

    print_fields(&[
        ("Status", status.status.to_string()),
        (
            "Step",
            status
                .current_step
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| "-".into()),
        ),
        ("Last error", status.last_error.unwrap_or_else(|| "-".into())),
        ("Updated", status.updated_at.to_rfc3339()),
    ]);

    if !status.balances.is_empty() {
        println!();
        let rows = status
            .balances
            .into_iter()
            .map(|(asset, balance)| vec![asset, balance])
            .collect();
        print_table(&["ASSET", "BALANCE"], rows);
    }
    Ok(())
}
