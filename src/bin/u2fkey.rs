use anyhow::{anyhow, Context as _, Result};
use clap::Parser as _;
use futures::executor::block_on;
use owo_colors::OwoColorize;
use pcsc::Context;
use tracing::{debug, trace, trace_span};
use u2fkey::pcsc::PCSC;
use u2fkey::response::{AppletVersion, RegisterResponse, SignResponse};
use u2fkey::{Device, Response};

#[derive(clap::Parser, Debug)]
struct Args {
    /// Increase log level.
    #[arg(short, long, action=clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease log level.
    #[arg(short, long, action=clap::ArgAction::Count)]
    quiet: u8,

    /// Use a specific reader (from list-readers).
    #[arg(short, long)]
    reader: Option<String>,

    /// Command.
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// List connected readers.
    ListReaders,

    /// Query the key's U2F protocol version.
    Version,

    /// Query the key's applet version.
    AppletVersion,

    /// Register a new key pair. Touch the key when it blinks.
    Enroll {
        /// Challenge (hex).
        challenge: String,
        /// Application ID hash (hex).
        app_id_hash: String,
    },

    /// Sign a challenge with a registered key pair. Touch the key when it blinks.
    Sign {
        /// Challenge hash (hex).
        challenge_hash: String,
        /// Application ID hash (hex).
        app_id_hash: String,
        /// Key handle from enroll (hex).
        key_handle: String,
        /// Only check whether the key handle belongs to this key; doesn't sign.
        #[arg(long)]
        check_only: bool,
    },
}

impl Command {
    pub fn run(&self, args: &Args) -> Result<()> {
        match self {
            Self::ListReaders => self.list_readers(args),
            Self::Version => self.version(args),
            Self::AppletVersion => self.applet_version(args),
            Self::Enroll {
                challenge,
                app_id_hash,
            } => self.enroll(args, challenge, app_id_hash),
            Self::Sign {
                challenge_hash,
                app_id_hash,
                key_handle,
                check_only,
            } => self.sign(args, challenge_hash, app_id_hash, key_handle, *check_only),
        }
    }

    fn list_readers(&self, _args: &Args) -> Result<()> {
        let span = trace_span!("list_readers");
        let _enter = span.enter();

        let ctx = Context::establish(pcsc::Scope::User)?;
        let mut readers_buf = [0; 2048];
        for name in ctx.list_readers(&mut readers_buf)? {
            println!("{}", name.to_str()?);
        }
        Ok(())
    }

    fn version(&self, args: &Args) -> Result<()> {
        let span = trace_span!("version");
        let _enter = span.enter();

        let mut dev = open_device(args)?;
        let data = checked(block_on(dev.version()))?;
        println!("{}", String::from_utf8_lossy(&data));
        Ok(())
    }

    fn applet_version(&self, args: &Args) -> Result<()> {
        let span = trace_span!("applet_version");
        let _enter = span.enter();

        let mut dev = open_device(args)?;
        let data = checked(block_on(dev.applet_version()))?;
        println!("{}", AppletVersion::parse(&data)?);
        Ok(())
    }

    fn enroll(&self, args: &Args, challenge: &str, app_id_hash: &str) -> Result<()> {
        let span = trace_span!("enroll");
        let _enter = span.enter();

        let challenge = hex::decode(challenge).context("challenge")?;
        let app_id_hash = hex::decode(app_id_hash).context("app ID hash")?;

        let mut dev = open_device(args)?;
        let data = checked(block_on(dev.enroll(&challenge, &app_id_hash))?)?;
        let reg = RegisterResponse::parse(&data)?;
        println!("public key:  {}", hex::encode(&reg.public_key));
        println!("key handle:  {}", hex::encode(&reg.key_handle));
        println!("certificate: {}", hex::encode(&reg.attestation_cert));
        println!("signature:   {}", hex::encode(&reg.signature));
        Ok(())
    }

    fn sign(
        &self,
        args: &Args,
        challenge_hash: &str,
        app_id_hash: &str,
        key_handle: &str,
        check_only: bool,
    ) -> Result<()> {
        let span = trace_span!("sign", check_only);
        let _enter = span.enter();

        let challenge_hash = hex::decode(challenge_hash).context("challenge hash")?;
        let app_id_hash = hex::decode(app_id_hash).context("app ID hash")?;
        let key_handle = hex::decode(key_handle).context("key handle")?;

        let mut dev = open_device(args)?;
        let rsp = block_on(dev.sign(&challenge_hash, &app_id_hash, &key_handle, check_only))?;
        if check_only {
            // The key doesn't sign anything here. It answers "touch me" (0x6985) for key
            // handles it knows, and "wrong data" (0x6A80) for ones it doesn't.
            return match rsp.status {
                u2fkey::Status::CONDITIONS_NOT_SATISFIED | u2fkey::Status::OK => {
                    println!("{}", "key handle belongs to this key".green());
                    Ok(())
                }
                u2fkey::Status::WRONG_DATA => {
                    println!("{}", "key handle does not belong to this key".yellow());
                    Ok(())
                }
                status => Err(anyhow!("check failed: {}", status)),
            };
        }

        let sig = SignResponse::parse(&checked(rsp)?)?;
        println!("user present: {}", sig.user_present());
        println!("counter:      {}", sig.counter);
        println!("signature:    {}", hex::encode(&sig.signature));
        Ok(())
    }
}

/// Prints a coloured status line and returns the payload of a successful response.
fn checked(rsp: Response) -> Result<Vec<u8>> {
    if rsp.status.is_ok() {
        eprintln!("{}", rsp.status.green());
    } else {
        eprintln!("{}", rsp.status.red());
    }
    Ok(rsp.into_result()?)
}

fn open_device(args: &Args) -> Result<Device<PCSC>> {
    let ctx = Context::establish(pcsc::Scope::User)?;
    let card = select_card(&ctx, &args.reader)?;
    Ok(Device::new(PCSC::new(card)?))
}

fn select_card(ctx: &Context, name_: &Option<String>) -> Result<pcsc::Card> {
    let span = trace_span!("select_card", name = ?name_);
    let _enter = span.enter();

    Ok(if let Some(name) = name_ {
        debug!(%name, "Connecting to named reader");
        // If the --reader flag is passed, use the reader name verbatim.
        ctx.connect(
            std::ffi::CString::new(name.clone())?.as_c_str(),
            pcsc::ShareMode::Shared,
            pcsc::Protocols::ANY,
        )?
    } else {
        // If not, use the first available reader.
        let mut readers_buf = [0; 2048];
        debug!("Listing available readers");
        let name = ctx
            .list_readers(&mut readers_buf)?
            .next()
            .ok_or(anyhow!("No supported reader connected"))?;

        debug!(?name, "Connecting to first available reader");
        ctx.connect(name, pcsc::ShareMode::Shared, pcsc::Protocols::ANY)?
    })
}

fn init_logging(args: &Args) {
    tracing_subscriber::fmt()
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_max_level(match (2 + args.verbose).saturating_sub(args.quiet) {
            0 => tracing::Level::ERROR,
            1 => tracing::Level::WARN,
            2 => tracing::Level::INFO,
            3 => tracing::Level::DEBUG,
            4.. => tracing::Level::TRACE,
        })
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);
    trace!(?args, "Starting up");
    args.command.run(&args)
}
