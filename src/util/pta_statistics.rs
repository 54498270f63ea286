//! Summary statistics over a finished analysis.

use log::*;
use std::io::{BufWriter, Write};

use crate::ir::program::Program;
use crate::pta::result::PTAResult;

pub struct PTAStat<'a> {
    program: &'a Program,
    result: &'a PTAResult,
}

impl<'a> PTAStat<'a> {
    pub fn new(program: &'a Program, result: &'a PTAResult) -> Self {
        PTAStat { program, result }
    }

    pub fn dump_stats(&self) {
        info!("Dumping pta statistics...");
        let mut writer = BufWriter::new(std::io::stdout());
        self.write_stats(&mut writer).expect("Unable to write data");
    }

    fn write_stats<W: Write>(&self, writer: &mut BufWriter<W>) -> std::io::Result<()> {
        let result = self.result;
        let num_cs_methods = result.reachable_methods().count();
        let num_methods = result.reachable_method_ids().len();
        let num_pointers = result.num_pointers();
        let num_pts_relations = result.num_pts_relations();
        let avg_pts = if num_pointers > 0 {
            num_pts_relations as f64 / num_pointers as f64
        } else {
            0.0
        };
        let num_app_methods = result
            .reachable_method_ids()
            .iter()
            .filter(|&&m| {
                let class = self.program.method(m).class;
                self.program.class(class).is_application
            })
            .count();

        writeln!(writer, "##########################################################")?;
        writeln!(writer, "Call Graph Statistics:")?;
        writeln!(writer, "#Reachable methods: {num_methods}")?;
        writeln!(writer, "#Reachable methods (context-sensitive): {num_cs_methods}")?;
        writeln!(writer, "#Reachable application methods: {num_app_methods}")?;
        writeln!(writer, "#Call graph edges: {}", result.call_graph().num_edges())?;
        writeln!(writer, "----------------------------------------------------------")?;
        writeln!(writer, "Points-to Statistics:")?;
        writeln!(writer, "#Pointers: {num_pointers}")?;
        writeln!(writer, "#Objects: {}", result.heap().num_objs())?;
        writeln!(writer, "#Points-to relations: {num_pts_relations}")?;
        writeln!(writer, "#Avg points-to size: {avg_pts:.2}")?;
        writeln!(writer, "##########################################################")?;
        Ok(())
    }
}
