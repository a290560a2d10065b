use std::process::ExitCode;

fn main() -> ExitCode
{
	let clargs = ota_rustdate::command::parse();

	match ota_rustdate::command::run(clargs) {
		Ok(code) => code,
		Err(e) => {
			eprintln!("Error: {e:#}");
			ExitCode::FAILURE
		}
	}
}
