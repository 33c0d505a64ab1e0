//! Interactive ledger console.

use super::config::RangerConfig;
use rand::Rng;
use rangerblock::clock;
use rangerblock::ledger::{Ledger, LedgerStore, Miner, MiningError};
use std::io::{BufRead, Write};
use std::time::{Duration, Instant};
use tracing::warn;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

const RULE: &str = "============================================================";
const TAMPER_AMOUNT: f64 = 999_999.0;

/// Open the ledger console on stdin/stdout
///
/// The ledger is loaded from `[ledger] store_path` (a fresh genesis chain if
/// the file does not exist) and saved after every change.
pub async fn execute(config: &RangerConfig, address: String) -> CliResult<()> {
    let store = LedgerStore::new(config.ledger_path());
    let ledger = open_ledger(&store, config)?;

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut console = LedgerConsole::new(ledger, Some(store), address, stdin.lock(), stdout.lock());
    console.run().await
}

fn open_ledger(store: &LedgerStore, config: &RangerConfig) -> CliResult<Ledger> {
    let ledger = match store.load()? {
        Some(snapshot) => Ledger::from_snapshot(snapshot, config.ledger.mining_reward, clock::system())?,
        None => Ledger::new(config.ledger_settings(), clock::system())?,
    };
    if let Err(e) = ledger.validate_chain() {
        warn!(path = %store.path().display(), error = %e, "stored ledger failed validation");
    }
    Ok(ledger)
}

pub struct LedgerConsole<R, W> {
    ledger: Ledger,
    store: Option<LedgerStore>,
    address: String,
    input: R,
    out: W,
}

impl<R: BufRead, W: Write> LedgerConsole<R, W> {
    pub fn new(ledger: Ledger, store: Option<LedgerStore>, address: String, input: R, out: W) -> Self {
        Self {
            ledger,
            store,
            address,
            input,
            out,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Menu loop until `9` or end of input.
    pub async fn run(&mut self) -> CliResult<()> {
        writeln!(self.out, "🎖️  RangerBlock Ledger")?;
        writeln!(self.out, "   Address: {}", self.address)?;

        loop {
            self.print_menu()?;
            let Some(choice) = self.prompt("Select option: ")? else {
                break;
            };

            match choice.as_str() {
                "1" => self.create_transaction()?,
                "2" => self.mine().await?,
                "3" => self.view_chain()?,
                "4" => self.check_balance()?,
                "5" => self.validate()?,
                "6" => self.view_pending()?,
                "7" => self.change_difficulty()?,
                "8" => self.tamper()?,
                "9" => {
                    writeln!(self.out, "\nRangers lead the way! 🎖️\n")?;
                    break;
                }
                _ => writeln!(self.out, "Invalid option")?,
            }
        }

        Ok(())
    }

    fn print_menu(&mut self) -> CliResult<()> {
        writeln!(self.out, "\n{}", RULE)?;
        for (key, label) in [
            ("1", "Create Transaction"),
            ("2", "Mine Pending Transactions"),
            ("3", "View Blockchain"),
            ("4", "Check Balance"),
            ("5", "Validate Chain"),
            ("6", "View Pending Transactions"),
            ("7", "Change Difficulty"),
            ("8", "Tamper with Chain (test security)"),
            ("9", "Exit"),
        ] {
            writeln!(self.out, "{}. {}", key, label)?;
        }
        writeln!(self.out, "{}", RULE)?;
        Ok(())
    }

    /// Trimmed line, or `None` at end of input.
    fn prompt(&mut self, label: &str) -> CliResult<Option<String>> {
        write!(self.out, "{}", label)?;
        self.out.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn prompt_or(&mut self, label: &str, default: &str) -> CliResult<String> {
        let answer = self.prompt(&format!("{} [{}]: ", label, default))?.unwrap_or_default();
        Ok(if answer.is_empty() {
            default.to_string()
        } else {
            answer
        })
    }

    fn save(&mut self) -> CliResult<()> {
        if let Some(store) = &self.store {
            store.save(&self.ledger.snapshot(1))?;
        }
        Ok(())
    }

    fn create_transaction(&mut self) -> CliResult<()> {
        let address = self.address.clone();
        let sender = self.prompt_or("Sender", &address)?;
        let recipient = self.prompt("Recipient: ")?.unwrap_or_default();
        let amount = self
            .prompt("Amount: ")?
            .and_then(|a| a.parse::<f64>().ok())
            .unwrap_or(f64::NAN);

        match self.ledger.create_transaction(&sender, &recipient, amount) {
            Ok(()) => {
                writeln!(self.out, "✅ Transaction added to pending pool")?;
                writeln!(self.out, "   {} → {}: {} coins", sender, recipient, amount)?;
                self.save()
            }
            Err(e) => {
                writeln!(self.out, "❌ {}", e)?;
                Ok(())
            }
        }
    }

    async fn mine(&mut self) -> CliResult<()> {
        let pending = self.ledger.pending_transactions().len();
        if pending == 0 {
            writeln!(self.out, "⚠️  No pending transactions to mine")?;
            return Ok(());
        }

        let difficulty = self.ledger.difficulty();
        let candidate = self.ledger.candidate_block(&self.address);
        writeln!(
            self.out,
            "⛏️  Mining block {} with {} pending transactions (difficulty {})...",
            candidate.index, pending, difficulty
        )?;

        let started = Instant::now();
        let handle = Miner::spawn(candidate, difficulty);
        while !handle.is_finished() {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(500)) => {
                    write!(self.out, "\r   {} hashes tried", handle.progress())?;
                    self.out.flush()?;
                }
                _ = tokio::signal::ctrl_c() => {
                    handle.cancel();
                }
            }
        }

        let block = match handle.wait().await {
            Ok(block) => block,
            Err(MiningError::Cancelled { attempts }) => {
                writeln!(self.out, "\n⚠️  Mining cancelled after {} attempts", attempts)?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let committed = self.ledger.commit_block(block)?;
        writeln!(self.out, "\n✅ Block mined!")?;
        writeln!(self.out, "   Nonce: {}", committed.nonce)?;
        writeln!(self.out, "   Hash: {}", committed.hash)?;
        writeln!(self.out, "   Time: {:.2}s", started.elapsed().as_secs_f64())?;
        writeln!(
            self.out,
            "✅ Mining reward: {} coins → {}",
            self.ledger.mining_reward(),
            self.address
        )?;
        self.save()
    }

    fn view_chain(&mut self) -> CliResult<()> {
        writeln!(self.out, "\n📊 Blockchain Status\n{}", RULE)?;
        for block in self.ledger.chain() {
            writeln!(self.out, "Block #{}", block.index)?;
            writeln!(self.out, "  Timestamp: {}", format_time(block.timestamp))?;
            writeln!(self.out, "  Previous Hash: {}...", short(&block.previous_hash))?;
            writeln!(self.out, "  Hash: {}...", short(&block.hash))?;
            writeln!(self.out, "  Nonce: {}", block.nonce)?;
            writeln!(self.out, "  Transactions ({}):", block.transactions.len())?;
            for (i, tx) in block.transactions.iter().enumerate() {
                writeln!(
                    self.out,
                    "    {}. {} → {}: {} coins",
                    i + 1,
                    tx.sender,
                    tx.recipient,
                    tx.amount
                )?;
            }
            writeln!(self.out)?;
        }
        let state = if self.ledger.is_chain_valid() {
            "VALID"
        } else {
            "INVALID"
        };
        writeln!(self.out, "Chain is {}\n{}", state, RULE)?;
        Ok(())
    }

    fn check_balance(&mut self) -> CliResult<()> {
        let address = self.address.clone();
        let address = self.prompt_or("Address", &address)?;
        let balance = self.ledger.get_balance_of_address(&address);
        writeln!(self.out, "💰 Balance of {}: {} coins", address, balance)?;
        Ok(())
    }

    fn validate(&mut self) -> CliResult<()> {
        writeln!(self.out, "🔍 Validating blockchain...")?;
        match self.ledger.validate_chain() {
            Ok(()) => writeln!(self.out, "✅ Blockchain is VALID!")?,
            Err(e) => {
                writeln!(self.out, "❌ {}", e)?;
                writeln!(self.out, "❌ Blockchain is INVALID! (tampered)")?;
            }
        }
        Ok(())
    }

    fn view_pending(&mut self) -> CliResult<()> {
        let pending = self.ledger.pending_transactions();
        writeln!(self.out, "📋 Pending Transactions ({})\n{}", pending.len(), RULE)?;
        if pending.is_empty() {
            writeln!(self.out, "No pending transactions")?;
        }
        for (i, tx) in pending.iter().enumerate() {
            writeln!(
                self.out,
                "{}. {} → {}: {} coins",
                i + 1,
                tx.sender,
                tx.recipient,
                tx.amount
            )?;
        }
        Ok(())
    }

    fn change_difficulty(&mut self) -> CliResult<()> {
        let label = format!("New difficulty (current: {}): ", self.ledger.difficulty());
        let requested = self
            .prompt(&label)?
            .and_then(|d| d.parse::<usize>().ok())
            .unwrap_or(0);

        match self.ledger.set_difficulty(requested) {
            Ok(()) => {
                writeln!(self.out, "✅ Difficulty changed to {}", requested)?;
                writeln!(
                    self.out,
                    "⚠️  Mining will now require {} leading zeros",
                    requested
                )?;
                if !self.ledger.is_chain_valid() {
                    writeln!(
                        self.out,
                        "⚠️  Existing blocks were mined at a lower difficulty; validation will fail"
                    )?;
                }
                self.save()
            }
            Err(e) => {
                writeln!(self.out, "❌ {}", e)?;
                Ok(())
            }
        }
    }

    fn tamper(&mut self) -> CliResult<()> {
        writeln!(self.out, "⚠️  SECURITY TEST: Tampering with blockchain")?;
        let blocks = self.ledger.chain().len();
        if blocks < 2 {
            writeln!(self.out, "Need at least 2 blocks to tamper")?;
            return Ok(());
        }

        let index = rand::thread_rng().gen_range(1..blocks) as u64;
        writeln!(self.out, "Tampering with block {}...", index)?;
        writeln!(
            self.out,
            "Original hash: {}",
            self.ledger.chain()[index as usize].hash
        )?;
        self.ledger.tamper_with_block(index, TAMPER_AMOUNT)?;
        writeln!(self.out, "Changed transaction amount to {}", TAMPER_AMOUNT)?;

        if self.ledger.is_chain_valid() {
            writeln!(self.out, "❌ Blockchain STILL VALID")?;
        } else {
            writeln!(self.out, "✅ Blockchain INVALID - tampering detected!")?;
        }
        // Not saved: the tampered chain only lives for this session
        Ok(())
    }
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(20)]
}

fn format_time(millis: u64) -> String {
    humantime::format_rfc3339_seconds(std::time::UNIX_EPOCH + Duration::from_millis(millis))
        .to_string()
}
