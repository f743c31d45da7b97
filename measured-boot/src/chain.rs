/*++

Licensed under the Apache-2.0 license.

File Name:

    chain.rs

Abstract:

    Boot chain driver. Runs the self tests, then admits each boot artifact
    through the secure boot gate before it is measured.

--*/

use crate::context::{BootStage, FinalizedBoot, MeasuredBootContext};
use crate::policy::BootPolicy;
use aegis_error::{AegisError, AegisResult};
use aegis_image_verify::{verify_artifact, ArtifactPolicy, SignatureEvidence, TrustAnchorList, Verdict};
use aegis_tpm::{FirmwareTpm, PlatformIo, TpmTransport};

/// Artifact presented to the boot chain
#[derive(Debug, Copy, Clone)]
pub struct BootArtifact<'b> {
    pub data: &'b [u8],

    /// Kernel or initrd path, recorded as event data
    pub path: Option<&'b str>,

    pub evidence: Option<SignatureEvidence<'b>>,

    pub policy: &'b ArtifactPolicy,
}

impl<'b> BootArtifact<'b> {
    pub fn new(data: &'b [u8], policy: &'b ArtifactPolicy) -> Self {
        Self {
            data,
            path: None,
            evidence: None,
            policy,
        }
    }

    pub fn with_path(mut self, path: &'b str) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_evidence(mut self, evidence: SignatureEvidence<'b>) -> Self {
        self.evidence = Some(evidence);
        self
    }
}

/// Secure and measured boot of one attempt
pub struct BootChain<'a, Io: PlatformIo, Fw: FirmwareTpm> {
    context: MeasuredBootContext<'a, Io, Fw>,
    anchors: TrustAnchorList,
    now: u64,
}

impl<'a, Io: PlatformIo, Fw: FirmwareTpm> BootChain<'a, Io, Fw> {
    /// Run the known answer tests and open the measurement context
    ///
    /// # Arguments
    ///
    /// * `tpm` - Trust-anchor transport, if present
    /// * `policy` - Boot policy
    /// * `anchors` - Trust anchors for artifact verification
    /// * `now` - Seconds since the Unix epoch
    pub fn start(
        tpm: Option<&'a mut TpmTransport<Io, Fw>>,
        policy: &BootPolicy,
        anchors: TrustAnchorList,
        now: u64,
    ) -> AegisResult<Self> {
        aegis_kat::run_all()?;
        let context = MeasuredBootContext::init(tpm, policy)?;
        Ok(Self {
            context,
            anchors,
            now,
        })
    }

    /// Verify an artifact, then measure it as `stage`
    ///
    /// A denied artifact aborts the boot attempt.
    pub fn load(&mut self, stage: BootStage, artifact: &BootArtifact) -> AegisResult<()> {
        if stage == BootStage::Separator {
            return Err(AegisError::MEASURED_BOOT_OUT_OF_ORDER);
        }
        if self.context.is_aborted() {
            return Err(AegisError::MEASURED_BOOT_ABORTED);
        }

        let verdict = verify_artifact(
            artifact.data,
            artifact.evidence.as_ref(),
            &self.anchors,
            artifact.policy,
            self.now,
        );
        if let Verdict::Deny(err) = verdict {
            log::error!(
                "[boot] {:?} artifact {} denied: {}",
                stage,
                artifact.policy.name(),
                err
            );
            return Err(self.context.abort(err));
        }

        let path = artifact.path.unwrap_or_default();
        match stage {
            BootStage::Bootloader => self.context.measure_bootloader(artifact.data),
            BootStage::Config => self.context.measure_config(artifact.data),
            BootStage::Kernel => self.context.measure_kernel(artifact.data, path),
            BootStage::Cmdline => self.context.measure_cmdline(artifact.data),
            BootStage::Initrd => self.context.measure_initrd(artifact.data, path),
            BootStage::Separator => Err(AegisError::MEASURED_BOOT_OUT_OF_ORDER),
        }
    }

    pub fn context(&self) -> &MeasuredBootContext<'a, Io, Fw> {
        &self.context
    }

    /// Measure the separator and seal the ledger
    pub fn finish(mut self) -> AegisResult<FinalizedBoot<'a, Io, Fw>> {
        self.context.measure_separator()?;
        self.context.finalize()
    }
}
