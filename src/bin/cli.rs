//! rzflash command line interface.

use std::{env, net::Ipv4Addr, process, time::Duration};

use clap::{
    crate_authors, crate_description, crate_name, crate_version, value_t, App, AppSettings::*,
    Arg, ArgGroup, ArgMatches,
};
use console::style;
use log::{debug, trace, LevelFilter};
use simplelog::*;

use rzflash::{self as rz, ImageKind, Operation, StorageTarget};

fn main() {
    println!("[RZ] rzflash v{}", crate_version!());

    ctrlc::set_handler(move || {
        println!("🛑 received Ctrl+C!");
        process::exit(130);
    })
    .expect("Failed to install my Ctrl-C handler!");

    let matches = app().get_matches();

    // Vary the output based on how many times the user used the "verbose" flag
    // (i.e. 'rzflash -v -v -v' or 'rzflash -vvv' vs 'rzflash -v'
    let log_level = match matches.occurrences_of("v") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .unwrap();

    trace!("{:#?}", matches);

    // Arguments with default values ===========================================

    // It's safe to call unwrap on all command line arguments with default
    // values, because the value with either be what the user input at runtime
    // or the default value

    let baud_rate = value_t!(matches.value_of("BAUD_RATE"), u32).unwrap_or_else(|_| {
        invalid_value(&matches, "BAUD_RATE", "serial_port_baud", "a numeric value")
    });

    let timeout = value_t!(matches.value_of("TIMEOUT"), u64)
        .unwrap_or_else(|_| invalid_value(&matches, "TIMEOUT", "timeout", "a numeric value"));

    let image_dir = match matches.value_of("IMAGE_PATH") {
        Some(dir) => dir.into(),
        None => env::current_dir().unwrap_or_default(),
    };

    // END - Arguments with default values =====================================

    let mut builder = rz::SettingsBuilder::default()
        .path(matches.value_of("SERIAL_PORT").unwrap())
        .baud_rate(baud_rate)
        .image_dir(image_dir)
        .debug(matches.is_present("DEBUG"))
        .response_timeout(match timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        });

    // START - Arguments with NO default values ================================

    if matches.is_present("QSPI") {
        builder = builder.target(StorageTarget::Qspi);
    }

    if matches.is_present("STATIC_IP") {
        let ip = value_t!(matches.value_of("STATIC_IP"), Ipv4Addr).unwrap_or_else(|_| {
            invalid_value(&matches, "STATIC_IP", "static_ip", "an IPv4 address")
        });
        builder = builder.static_ip(ip);
    }

    let overrides = [
        ("IMAGE_WRITER", ImageKind::FlashWriter),
        ("IMAGE_BL2", ImageKind::Bl2),
        ("IMAGE_FIP", ImageKind::Fip),
        ("IMAGE_ROOTFS", ImageKind::Rootfs),
    ];
    for (name, kind) in overrides.iter() {
        if let Some(path) = matches.value_of(*name) {
            builder = builder.image(*kind, path);
        }
    }

    // END - Arguments =========================================================

    let operation = select_operation(&matches).unwrap_or_else(|code| process::exit(code));

    let settings = builder.finalize();
    debug!("{:?}: {:#?}", operation, settings);

    // Run the session =========================================================

    let status = exit_code(&rz::factory(settings, operation).run());
    debug!("exit code: {}", status);
    process::exit(status);
}

fn app() -> App<'static, 'static> {
    App::new(crate_name!())
        .version(concat!("v", crate_version!()))
        .author(crate_authors!())
        .about(crate_description!())
        .long_about(
            "\n\
            Flashes the bootloader chain and the system image of an RZ/V2L \
            board over its serial console.\n\
            \n\
            To flash the bootloader, set the board's boot switches for SCIF \
            download mode, start the tool, then power the board on when asked \
            to. The Flash Writer is pushed first, then the bl2 and FIP images \
            are written to eMMC (or to QSPI flash with `--qspi`).\n\
            \n\
            To flash the rootfs, set the board's boot switches to boot from \
            its storage, connect it to the network, start the tool and power \
            the board on. U-Boot is stopped, a UDP fastboot listener started \
            on the board and the system image is sent with the `fastboot` \
            client extracted from the `adb` directory.\
        ",
        )
        .max_term_width(80)
        .setting(ColoredHelp)
        .setting(NextLineHelp)
        .after_help(USAGE_EXAMPLES)
        .arg(
            Arg::with_name("BOOTLOADER")
                .help("flash the bootloader only")
                .long("--bootloader"),
        )
        .arg(
            Arg::with_name("ROOTFS")
                .help("flash the rootfs only")
                .long("--rootfs"),
        )
        .arg(
            Arg::with_name("FULL")
                .help("flash the bootloader and the rootfs")
                .long("--full"),
        )
        .group(ArgGroup::with_name("MODE").args(&["BOOTLOADER", "ROOTFS", "FULL"]))
        .arg(
            Arg::with_name("SERIAL_PORT")
                .help("the serial port connected to the board's console")
                .long("--serial_port")
                .takes_value(true)
                .default_value("/dev/ttyUSB0"),
        )
        .arg(
            Arg::with_name("BAUD_RATE")
                .help("serial port baud rate")
                .long("--serial_port_baud")
                .takes_value(true)
                .default_value("115200"),
        )
        .arg(
            Arg::with_name("IMAGE_WRITER")
                .help("path to the Flash Writer image")
                .long("--image_writer")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("IMAGE_BL2")
                .help("path to the bl2 image")
                .long("--image_bl2")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("IMAGE_FIP")
                .help("path to the FIP image")
                .long("--image_fip")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("IMAGE_ROOTFS")
                .help("path to the rootfs (.wic) image")
                .long("--image_rootfs")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("IMAGE_PATH")
                .help("directory holding the images")
                .long_help(
                    "directory holding the images under their default \
                     names; when not set, images are looked for in the \
                     current working directory. Individual image options \
                     take precedence.",
                )
                .long("--image_path")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("STATIC_IP")
                .help("static IPv4 address for the board, instead of DHCP")
                .long("--static_ip")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("QSPI")
                .help("write the bootloader to QSPI flash instead of eMMC")
                .long("--qspi"),
        )
        .arg(
            Arg::with_name("DEBUG")
                .help("echo the board's serial output")
                .long("--debug"),
        )
        .arg(
            Arg::with_name("TIMEOUT")
                .help("seconds to wait for each answer from the board, 0 to wait forever")
                .long("--timeout")
                .takes_value(true)
                .default_value("300"),
        )
        .arg(Arg::with_name("v").short("v").multiple(true).help(
            "Sets the logging level of verbosity, repeat several times for \
                higher verbosity",
        ))
}

/// The operation asked for on the command line. When nothing was asked for,
/// prints the usage examples and returns the exit status to use.
fn select_operation(matches: &ArgMatches) -> Result<Operation, i32> {
    Operation::select(
        matches.is_present("BOOTLOADER"),
        matches.is_present("ROOTFS"),
        matches.is_present("FULL"),
        ["IMAGE_WRITER", "IMAGE_BL2", "IMAGE_FIP"]
            .iter()
            .all(|name| matches.is_present(name)),
        matches.is_present("IMAGE_ROOTFS"),
    )
    .ok_or_else(|| {
        eprintln!(
            "{}: nothing to flash, use one of `{}`, `{}` or `{}`",
            style("error").red(),
            style("--bootloader").cyan(),
            style("--rootfs").cyan(),
            style("--full").cyan()
        );
        eprintln!("{}", USAGE_EXAMPLES);
        2
    })
}

/// Process exit status for the outcome of a session. The session already
/// reported any error.
fn exit_code(outcome: &rz::Result<()>) -> i32 {
    match outcome {
        Ok(()) => {
            println!("{}", style("[RZ] ✅ All done!").green());
            0
        }
        Err(_) => 1,
    }
}

const USAGE_EXAMPLES: &str = "\
EXAMPLES:
    Flash the bootloader to eMMC:
        rzflash --bootloader
    Flash the bootloader to QSPI flash, images in another directory:
        rzflash --bootloader --qspi --image_path ./images
    Flash the rootfs with a static address:
        rzflash --rootfs --static_ip 192.168.1.99
    Flash everything on another port:
        rzflash --full --serial_port /dev/ttyUSB1";

fn invalid_value(matches: &ArgMatches, arg: &str, long: &str, kind: &str) -> ! {
    eprintln!(
        "{}: `{}` needs to be {}",
        style("error").red(),
        style(long).cyan(),
        kind
    );
    eprintln!(
        "   {} `{}` is not a valid value",
        style("-->").cyan(),
        style(matches.value_of(arg).unwrap_or_default()).on_red()
    );
    process::exit(2);
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rzflash::FlashError;

    fn select(args: &[&str]) -> Result<Operation, i32> {
        let matches = app().get_matches_from_safe(args.to_vec()).unwrap();
        select_operation(&matches)
    }

    #[test]
    fn nothing_to_flash_is_a_usage_error() {
        assert_eq!(select(&["rzflash"]), Err(2));
        assert_eq!(
            select(&["rzflash", "--qspi", "--image_bl2", "bl2.srec"]),
            Err(2)
        );
    }

    #[test]
    fn mode_flags() {
        assert_eq!(
            select(&["rzflash", "--bootloader"]),
            Ok(Operation::Bootloader)
        );
        assert_eq!(select(&["rzflash", "--rootfs"]), Ok(Operation::Rootfs));
        assert_eq!(select(&["rzflash", "--full"]), Ok(Operation::Full));
        // An explicit mode wins over the images given.
        let args = [
            "rzflash",
            "--rootfs",
            "--image_writer",
            "w",
            "--image_bl2",
            "b",
            "--image_fip",
            "f",
        ];
        assert_eq!(select(&args), Ok(Operation::Rootfs));
    }

    #[test]
    fn image_overrides_imply_a_mode() {
        let bootloader = [
            "rzflash",
            "--image_writer",
            "w",
            "--image_bl2",
            "b",
            "--image_fip",
            "f",
        ];
        assert_eq!(select(&bootloader), Ok(Operation::Bootloader));

        assert_eq!(
            select(&["rzflash", "--image_rootfs", "r.wic"]),
            Ok(Operation::Rootfs)
        );

        let mut full = bootloader.to_vec();
        full.extend_from_slice(&["--image_rootfs", "r.wic"]);
        assert_eq!(select(&full), Ok(Operation::Full));
    }

    #[test]
    fn mode_flags_are_exclusive() {
        assert!(app()
            .get_matches_from_safe(vec!["rzflash", "--bootloader", "--full"])
            .is_err());
    }

    #[test]
    fn exit_status() {
        assert_eq!(exit_code(&Ok(())), 0);
        assert_eq!(
            exit_code(&Err(FlashError::InvalidDeviceAddress(String::new()))),
            1
        );
    }
}
