use apex_sim::{
    config::SimConfig,
    cpu::{Cpu, CpuState, ExecResult},
    emulated::Emulated,
    error::SimError,
    inst::ArchReg,
    out_of_order::OutOfOrder,
    parse_and_exec,
    pipelined::Pipelined,
    program::Program,
    rob::RobStatus,
};

const PROGRAMS: [&str; 12] = [
    "array_sum",
    "branch",
    "dependency",
    "factorial",
    "halt",
    "hazard_war",
    "hazard_waw",
    "implicit_halt",
    "jump",
    "logic",
    "loop",
    "memory",
];

fn exec<C: Cpu>(name: &str) -> ExecResult {
    parse_and_exec::<C>(name, &SimConfig::default())
        .unwrap_or_else(|e| panic!("{name} failed: {e}"))
}

fn exec_src<C: Cpu>(src: &str, config: &SimConfig) -> Result<ExecResult, SimError> {
    let prog = src.parse::<Program>()?;
    C::new(prog, config)?.exec_all()
}

fn r(n: u16) -> ArchReg {
    ArchReg(n)
}

#[generic_tests::define]
mod t {
    use super::*;

    #[test]
    fn test_dependency<C: Cpu>() {
        let res = exec::<C>("dependency");
        assert_eq!(res.regs.get(r(2)), 10);
        assert_eq!(res.regs.get(r(3)), 50);
        assert_eq!(res.regs.get(r(4)), 0);
        assert!(res.zero_flag);
        assert_eq!(res.stats.insts_retired, 5);
    }

    #[test]
    fn test_branch<C: Cpu>() {
        let res = exec::<C>("branch");
        assert_eq!(res.regs.get(r(2)), 0);
        assert_eq!(res.regs.get(r(3)), 2);
        assert_eq!(res.regs.get(r(4)), 2);
        assert_eq!(res.regs.get(r(5)), 0);
        assert_eq!(res.stats.branches_taken, 2);
        assert_eq!(res.stats.insts_retired, 7);
    }

    #[test]
    fn test_loop<C: Cpu>() {
        let res = exec::<C>("loop");
        assert_eq!(res.mem.read(10), Some(15));
        assert_eq!(res.regs.get(r(1)), 0);
        assert_eq!(res.stats.branches_taken, 4);
        assert_eq!(res.stats.insts_retired, 20);
    }

    #[test]
    fn test_memory<C: Cpu>() {
        let res = exec::<C>("memory");
        assert_eq!(res.mem.read(100), Some(7));
        assert_eq!(res.mem.read(104), Some(7));
        assert_eq!(res.mem.read(0), Some(8));
        assert_eq!(res.regs.get(r(5)), 7);
    }

    #[test]
    fn test_logic<C: Cpu>() {
        let res = exec::<C>("logic");
        assert_eq!(res.regs.get(r(3)), 8);
        assert_eq!(res.regs.get(r(4)), 14);
        assert_eq!(res.regs.get(r(5)), 6);
        assert_eq!(res.regs.get(r(6)), -2);
        assert!(!res.zero_flag);
    }

    #[test]
    fn test_hazard_waw<C: Cpu>() {
        let res = exec::<C>("hazard_waw");
        assert_eq!(res.regs.get(r(2)), 3);
        assert_eq!(res.mem.read(0), Some(3));
    }

    #[test]
    fn test_hazard_war<C: Cpu>() {
        let res = exec::<C>("hazard_war");
        assert_eq!(res.mem.read(0), Some(26));
        assert_eq!(res.mem.read(1), Some(9));
    }

    #[test]
    fn test_jump<C: Cpu>() {
        let res = exec::<C>("jump");
        assert_eq!(res.regs.get(r(1)), 0);
        assert_eq!(res.regs.get(r(2)), 0);
        assert_eq!(res.regs.get(r(3)), 3);
        assert_eq!(res.stats.branches_taken, 1);
    }

    #[test]
    fn test_jump_is_pc_relative<C: Cpu>() {
        let res = exec_src::<C>("JUMP,R0,#8\nMOVC,R1,#1\nMOVC,R2,#2\nHALT", &SimConfig::default())
            .expect("no fault");
        assert_eq!(res.regs.get(r(1)), 0);
        assert_eq!(res.regs.get(r(2)), 2);
    }

    #[test]
    fn test_literal_arithmetic_keeps_flag<C: Cpu>() {
        // SUBL yields zero, but the flag still reflects the ADD.
        let src = "MOVC,R1,#5\nADD,R2,R1,R1\nSUBL,R3,R1,#5\nBNZ,#8\nMOVC,R4,#1\nHALT";
        let res = exec_src::<C>(src, &SimConfig::default()).expect("no fault");
        assert_eq!(res.regs.get(r(3)), 0);
        assert_eq!(res.regs.get(r(4)), 0);
        assert!(!res.zero_flag);
        assert_eq!(res.stats.branches_taken, 1);
    }

    #[test]
    fn test_nothing_after_halt<C: Cpu>() {
        let res = exec::<C>("halt");
        assert_eq!(res.regs.get(r(1)), 1);
        assert_eq!(res.stats.insts_retired, 2);
    }

    #[test]
    fn test_implicit_halt<C: Cpu>() {
        let res = exec::<C>("implicit_halt");
        assert_eq!(res.regs.get(r(2)), 7);
        assert_eq!(res.stats.insts_retired, 3);
    }

    #[test]
    fn test_factorial<C: Cpu>() {
        let res = exec::<C>("factorial");
        assert_eq!(res.mem.read(0), Some(120));
    }

    #[test]
    fn test_array_sum<C: Cpu>() {
        let res = exec::<C>("array_sum");
        assert_eq!(res.mem.read(0), Some(10));
        assert_eq!(&res.mem.words()[20..24], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_register_out_of_range<C: Cpu>() {
        let err = exec_src::<C>("MOVC,R30,#1\nHALT", &SimConfig::default());
        assert!(matches!(
            err,
            Err(SimError::RegisterIndexOutOfRange {
                pc: 4000,
                reg: 30,
                limit: 24
            })
        ));
    }

    #[test]
    fn test_memory_out_of_range<C: Cpu>() {
        let err = exec_src::<C>("MOVC,R1,#-1\nLOAD,R2,R1,#0\nHALT", &SimConfig::default());
        assert!(matches!(
            err,
            Err(SimError::MemoryAddressOutOfRange { pc: 4004, addr: -1 })
        ));

        let err = exec_src::<C>("STORE,R0,R0,#4096\nHALT", &SimConfig::default());
        assert!(matches!(err, Err(SimError::MemoryAddressOutOfRange { .. })));
    }

    #[test]
    fn test_bad_jump_target<C: Cpu>() {
        let err = exec_src::<C>("MOVC,R1,#3\nJUMP,R1,#-8\nHALT", &SimConfig::default());
        assert!(matches!(
            err,
            Err(SimError::ProgramCounterOutOfRange { pc: 3996 })
        ));

        let err = exec_src::<C>("JUMP,R0,#2\nHALT", &SimConfig::default());
        assert!(matches!(
            err,
            Err(SimError::ProgramCounterOutOfRange { pc: 4002 })
        ));
    }

    #[test]
    fn test_invalid_config<C: Cpu>() {
        let config = SimConfig {
            memory_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            exec_src::<C>("HALT", &config),
            Err(SimError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_stopped_is_sticky<C: Cpu>() {
        let prog = "MOVC,R1,#1\nHALT".parse::<Program>().expect("valid program");
        let mut cpu = C::new(prog, &SimConfig::default()).expect("valid config");

        let res = cpu.run_until_complete().expect("no fault");
        assert_eq!(cpu.step().expect("no fault"), CpuState::Stopped);
        assert_eq!(cpu.snapshot(), res);
    }

    #[instantiate_tests(<Emulated>)]
    mod emulated {}

    #[instantiate_tests(<Pipelined>)]
    mod pipelined {}

    #[instantiate_tests(<OutOfOrder>)]
    mod out_of_order {}
}

#[cfg(test)]
mod out_of_order {
    use hashbrown::HashSet;

    use super::*;

    fn ooo(name: &str, config: &SimConfig) -> OutOfOrder {
        let contents = std::fs::read_to_string(format!("asm/{name}.asm")).expect("asm file");
        let prog = contents.parse::<Program>().expect("valid program");
        OutOfOrder::new(prog, config).expect("valid config")
    }

    #[test]
    fn test_retires_in_program_order() {
        for name in PROGRAMS {
            let mut cpu = ooo(name, &SimConfig::default());
            cpu.run_until_complete().expect("no fault");

            let tags = cpu.retirements().iter().map(|r| r.tag).collect::<Vec<_>>();
            assert!(
                tags.windows(2).all(|w| w[0] < w[1]),
                "{name}: out of order retirement"
            );
        }
    }

    #[test]
    fn test_skipped_instructions_never_retire() {
        let mut cpu = ooo("branch", &SimConfig::default());
        cpu.run_until_complete().expect("no fault");
        assert!(cpu
            .retirements()
            .iter()
            .all(|r| r.pc != 4012 && r.pc != 4028));

        let mut cpu = ooo("halt", &SimConfig::default());
        cpu.run_until_complete().expect("no fault");
        assert!(cpu.retirements().iter().all(|r| r.pc != 4008));
    }

    #[test]
    fn test_younger_ready_completes_first() {
        let src = "MOVC,R1,#3\nMUL,R2,R1,R1\nADDL,R3,R2,#1\nMOVC,R4,#9\nHALT";
        let prog = src.parse::<Program>().expect("valid program");
        let mut cpu = OutOfOrder::new(prog, &SimConfig::default()).expect("valid config");

        let status = |cpu: &OutOfOrder, pc| {
            cpu.rob()
                .iter()
                .find(|e| e.pc == pc)
                .map(|e| e.status)
        };

        let mut overtaken = false;
        while cpu.step().expect("no fault") == CpuState::Running {
            if status(&cpu, 4012) == Some(RobStatus::Executed)
                && status(&cpu, 4008) == Some(RobStatus::Executing)
            {
                overtaken = true;
            }
        }

        assert!(overtaken, "MOVC,R4 never finished ahead of the waiting ADDL");
        let res = cpu.snapshot();
        assert_eq!(res.regs.get(r(3)), 10);
        assert_eq!(res.regs.get(r(4)), 9);
    }

    #[test]
    fn test_one_retirement_per_cycle() {
        let mut cpu = ooo("array_sum", &SimConfig::default());
        let mut retired = 0;

        while cpu.step().expect("no fault") == CpuState::Running {
            let now = cpu.retirements().len();
            assert!(now - retired <= 1);
            retired = now;
        }
    }

    #[test]
    fn test_single_writer_per_phys_reg() {
        let mut cpu = ooo("hazard_waw", &SimConfig::default());

        loop {
            let mut seen = HashSet::new();
            for dest in cpu.rob().iter().filter_map(|e| e.dest) {
                assert!(seen.insert(dest), "{dest} has two in-flight writers");
            }

            if cpu.step().expect("no fault") == CpuState::Stopped {
                break;
            }
        }
    }

    #[test]
    fn test_deterministic() {
        for name in PROGRAMS {
            let mut a = ooo(name, &SimConfig::default());
            let mut b = ooo(name, &SimConfig::default());

            assert_eq!(
                a.run_until_complete().expect("no fault"),
                b.run_until_complete().expect("no fault")
            );
            assert_eq!(a.retirements(), b.retirements());
        }
    }

    #[test]
    fn test_tiny_structures() {
        let config = SimConfig {
            phys_reg_count: 2,
            rob_capacity: 2,
            issue_queue_capacity: 1,
            lsq_capacity: 1,
            ..Default::default()
        };

        for name in PROGRAMS {
            let expected = exec::<Emulated>(name);
            let mut cpu = ooo(name, &config);
            let res = cpu.run_until_complete().expect("no fault");

            assert_eq!(res.regs, expected.regs, "{name}: registers differ");
            assert_eq!(res.mem, expected.mem, "{name}: memory differs");
        }

        let res = ooo("loop", &config).exec_all().expect("no fault");
        assert!(res.stats.rob_full_stalls + res.stats.phys_reg_stalls > 0);
    }

    #[test]
    fn test_run_cycle_limit() {
        let mut cpu = ooo("loop", &SimConfig::default());
        assert_eq!(cpu.run(3).expect("no fault"), CpuState::Running);
        assert_eq!(cpu.snapshot().stats.cycles, 3);
        assert_eq!(cpu.snapshot().mem.read(10), Some(0));

        assert_eq!(cpu.run(u64::MAX).expect("no fault"), CpuState::Stopped);
        assert_eq!(cpu.snapshot().mem.read(10), Some(15));
    }

    #[test]
    fn test_stage_trace() {
        let mut cpu = ooo("dependency", &SimConfig::default());
        cpu.run(4).expect("no fault");

        let trace = cpu.stage_trace();
        assert_eq!(trace[0].stage.to_string(), "Fetch");
        assert!(trace.iter().any(|t| !t.is_empty()));
        assert!(trace.iter().any(|t| t.stage.to_string() == "ROB" && !t.is_empty()));
    }

    #[test]
    fn test_no_free_regs_left_behind() {
        let mut cpu = ooo("array_sum", &SimConfig::default());
        cpu.run_until_complete().expect("no fault");

        let prf = cpu.reg_file().prf();
        assert_eq!(prf.free_count(), prf.entries().len());
        assert!(cpu.rob().is_empty());
    }
}

#[cfg(test)]
mod cosim {
    use super::*;

    fn same_state(a: &ExecResult, b: &ExecResult) -> bool {
        a.regs == b.regs && a.mem == b.mem && a.zero_flag == b.zero_flag
    }

    #[test]
    fn test_models_agree() {
        for name in PROGRAMS {
            let emu = exec::<Emulated>(name);
            let pipe = exec::<Pipelined>(name);
            let ooo = exec::<OutOfOrder>(name);

            assert!(same_state(&emu, &pipe), "{name}: pipelined differs");
            assert!(same_state(&emu, &ooo), "{name}: out-of-order differs");
            assert_eq!(emu.stats.insts_retired, ooo.stats.insts_retired);
        }
    }
}
