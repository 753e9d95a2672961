use std::net::Ipv4Addr;
use std::path::Path;

use anyhow::Context as _;
use aya::maps::HashMap as BpfHashMap;
use aya::programs::lsm::LsmLink;
use aya::programs::tc::{NlOptions, SchedClassifier, TcAttachOptions, TcAttachType};
use aya::programs::links::FdLink;
use aya::programs::Lsm;
use aya::{Btf, Ebpf};

use lockdown_ebpf_shared::{AppKey, IpKey, Marker, PRESENT};

use crate::error::KernelError;

/// Raw `EOPNOTSUPP`, used to distinguish "driver doesn't support this" from
/// every other attach failure. Mirrors the predecessor's
/// `errors.Is(err, unix.EOPNOTSUPP)` check.
const EOPNOTSUPP: i32 = 95;

const EXEC_GATE_PROGRAM: &str = "exec_gate";
const EXEC_GATE_HOOK: &str = "bprm_check_security";
const EXEC_GATE_MAP: &str = "APP_ALLOWLIST";

const EGRESS_GATE_PROGRAM: &str = "egress_gate";
const EGRESS_GATE_MAP: &str = "IP_ALLOWLIST";
const EGRESS_PRIORITY: u16 = 1;
const EGRESS_HANDLE: u32 = 1;

/// Owns the loaded/attached kernel programs and their map handles for the
/// lifetime of the daemon. Dropping (or calling `stop_*`) detaches them.
#[derive(Default)]
pub struct KernelBridge {
    exec_gate: Option<ExecGate>,
    egress_gate: Option<EgressGate>,
}

struct ExecGate {
    ebpf: Ebpf,
    // Keeping this alive is what keeps the LSM hook attached; dropping it detaches.
    _link: LsmLink,
}

struct EgressGate {
    ebpf: Ebpf,
    iface: String,
    // Keeping this alive is what keeps the TC classifier attached.
    _link: FdLink,
}

impl KernelBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_exec_gate(&mut self, object_path: &Path) -> Result<(), KernelError> {
        raise_memlock_rlimit()?;

        let bytes = std::fs::read(object_path).map_err(|source| KernelError::LoadFailed {
            path: object_path.display().to_string(),
            source: anyhow::Error::new(source).context("failed to read exec-gate object file"),
        })?;

        let mut ebpf = Ebpf::load(&bytes).map_err(|e| KernelError::LoadFailed {
            path: object_path.display().to_string(),
            source: anyhow::Error::new(e),
        })?;
        let _ = aya_log::EbpfLogger::init(&mut ebpf);

        let attach = (|| -> anyhow::Result<LsmLink> {
            let program: &mut Lsm = ebpf
                .program_mut(EXEC_GATE_PROGRAM)
                .context("exec-gate object has no `exec_gate` program")?
                .try_into()
                .context("exec-gate program is not an LSM program")?;

            let btf = Btf::from_sys_fs().context("failed to read kernel BTF")?;
            program.load(EXEC_GATE_HOOK, &btf).context("failed to load exec_gate program")?;

            let link_id = program.attach().context("failed to attach to bprm_check_security")?;
            let link = program
                .take_link(link_id)
                .context("failed to take ownership of exec_gate link")?;

            Ok(link.try_into()?)
        })();

        let link = match attach {
            Ok(link) => link,
            Err(source) => {
                // Loading succeeded but attaching failed: undo the load so we don't
                // leak a half-initialized program, per the fatal-and-undo contract.
                drop(ebpf);
                return Err(classify_attach_error(EXEC_GATE_HOOK, source));
            }
        };

        tracing::info!(hook = EXEC_GATE_HOOK, "exec gate attached");

        self.exec_gate = Some(ExecGate { ebpf, _link: link });

        Ok(())
    }

    pub fn start_egress_gate(&mut self, iface: &str, object_path: &Path) -> Result<(), KernelError> {
        let bytes = std::fs::read(object_path).map_err(|source| KernelError::LoadFailed {
            path: object_path.display().to_string(),
            source: anyhow::Error::new(source).context("failed to read egress-gate object file"),
        })?;

        let mut ebpf = Ebpf::load(&bytes).map_err(|e| KernelError::LoadFailed {
            path: object_path.display().to_string(),
            source: anyhow::Error::new(e),
        })?;
        let _ = aya_log::EbpfLogger::init(&mut ebpf);

        if let Err(e) = aya::programs::tc::qdisc_add_clsact(iface) {
            if e.raw_os_error() != Some(libc::EEXIST) {
                return Err(classify_attach_error("clsact qdisc", anyhow::Error::new(e)));
            }
        }

        let attach = (|| -> anyhow::Result<FdLink> {
            let program: &mut SchedClassifier = ebpf
                .program_mut(EGRESS_GATE_PROGRAM)
                .context("egress-gate object has no `egress_gate` program")?
                .try_into()
                .context("egress-gate program is not a classifier")?;

            program.load().context("failed to load egress_gate program")?;

            let link_id = program
                .attach_with_options(
                    iface,
                    TcAttachType::Egress,
                    TcAttachOptions::Netlink(NlOptions {
                        priority: EGRESS_PRIORITY,
                        handle: EGRESS_HANDLE,
                    }),
                )
                .context("failed to attach TC egress classifier")?;

            let link = program
                .take_link(link_id)
                .context("failed to take ownership of egress_gate link")?;

            Ok(link.try_into()?)
        })();

        let link = match attach {
            Ok(link) => link,
            Err(source) => {
                drop(ebpf);
                return Err(classify_attach_error("TC egress classifier", source));
            }
        };

        tracing::info!(%iface, "egress gate attached");

        self.egress_gate = Some(EgressGate {
            ebpf,
            iface: iface.to_owned(),
            _link: link,
        });

        Ok(())
    }

    pub fn sync_allowed_apps(&mut self, apps: &[AppKey]) -> Result<(), KernelError> {
        let gate = self.exec_gate.as_mut().ok_or(KernelError::Unsupported {
            what: "exec_gate (not started)",
        })?;

        let mut map: BpfHashMap<_, AppKey, Marker> = gate
            .ebpf
            .map_mut(EXEC_GATE_MAP)
            .context("APP_ALLOWLIST map not found")
            .and_then(|m| BpfHashMap::try_from(m).context("map has the wrong key/value types"))
            .map_err(KernelError::MapUpdate)?;

        let stale_keys: Vec<AppKey> = map.keys().filter_map(Result::ok).collect();

        for key in stale_keys {
            map.remove(&key)
                .map_err(|e| KernelError::MapUpdate(anyhow::Error::new(e)))?;
        }

        for app in apps {
            map.insert(app, PRESENT, 0)
                .map_err(|e| KernelError::MapUpdate(anyhow::Error::new(e)))?;
        }

        Ok(())
    }

    pub fn allow_ip(&mut self, ipv4_str: &str) -> Result<(), KernelError> {
        let addr: Ipv4Addr = ipv4_str
            .parse()
            .map_err(|e| KernelError::InvalidAddress(ipv4_str.to_owned(), Some(e)))?;

        let gate = self.egress_gate.as_mut().ok_or(KernelError::Unsupported {
            what: "egress_gate (not started)",
        })?;

        let mut map: BpfHashMap<_, IpKey, Marker> = gate
            .ebpf
            .map_mut(EGRESS_GATE_MAP)
            .context("IP_ALLOWLIST map not found")
            .and_then(|m| BpfHashMap::try_from(m).context("map has the wrong key/value types"))
            .map_err(KernelError::MapUpdate)?;

        let key = IpKey::from_octets(addr.octets());

        map.insert(key, PRESENT, 0)
            .map_err(|e| KernelError::MapUpdate(anyhow::Error::new(e)))?;

        Ok(())
    }

    pub fn stop_exec_gate(&mut self) {
        if self.exec_gate.take().is_some() {
            tracing::info!("exec gate detached");
        }
    }

    pub fn stop_egress_gate(&mut self) {
        if let Some(gate) = self.egress_gate.take() {
            tracing::info!(iface = %gate.iface, "egress gate detached");
        }
    }
}

fn classify_attach_error(what: &'static str, source: anyhow::Error) -> KernelError {
    let is_unsupported = source
        .chain()
        .filter_map(|e| e.downcast_ref::<std::io::Error>())
        .any(|e| e.raw_os_error() == Some(EOPNOTSUPP));

    if is_unsupported {
        return KernelError::Unsupported { what };
    }

    KernelError::AttachFailed { what, source }
}

fn raise_memlock_rlimit() -> Result<(), KernelError> {
    let limit = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };

    // SAFETY: `setrlimit` with a stack-local, well-formed `rlimit` value is safe.
    let rc = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &limit) };
    if rc != 0 {
        return Err(KernelError::MemlockFailed(std::io::Error::last_os_error()));
    }

    Ok(())
}
